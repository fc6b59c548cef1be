use chrono::Utc;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::ports::StoragePort;
use crate::domain::{FileRecord, Lookup, Partition, Schema};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::frame::Frame;

/// Structural validation of a raw batch against the declared schema.
///
/// Files are first copied into the good/bad partitions by name, then files in
/// the good partition are re-opened and moved to bad when their contents fail
/// the schema. The raw batch itself is never touched.
pub struct FileValidator {
    storage: Arc<dyn StoragePort>,
    good_prefix: String,
    bad_prefix: String,
}

/// Builds the file-name pattern from the schema: literal `wafer_` prefix
/// (case-insensitive `w`), a date stamp digit run, a time stamp digit run and
/// the `.csv` suffix. A declared length below 1 relaxes that run to zero or
/// more digits.
pub fn file_name_pattern(schema: &Schema) -> Result<Regex> {
    let date_quantifier = digit_quantifier(schema.date_stamp_length);
    let time_quantifier = digit_quantifier(schema.time_stamp_length);
    let pattern = format!(
        "^[Ww]afer_[0-9]{{{}}}_[0-9]{{{}}}\\.csv$",
        date_quantifier, time_quantifier
    );
    Regex::new(&pattern).map_err(|e| PipelineError::Schema(format!("invalid file-name pattern: {}", e)))
}

fn digit_quantifier(length: usize) -> String {
    if length < 1 {
        "0,".to_string()
    } else {
        length.to_string()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl FileValidator {
    pub fn new(storage: Arc<dyn StoragePort>, good_prefix: String, bad_prefix: String) -> Self {
        Self {
            storage,
            good_prefix,
            bad_prefix,
        }
    }

    /// Clears both partitions so partial state from an earlier failed run
    /// never leaks into this one.
    pub async fn clear_partitions(&self) -> Result<()> {
        self.storage.delete_prefix(&self.good_prefix).await?;
        self.storage.delete_prefix(&self.bad_prefix).await?;
        info!("existing good and bad data partitions cleared");
        Ok(())
    }

    /// Copies every batch file into the good or bad partition by file name.
    /// A missing or empty batch directory is fatal before any partitioning.
    pub async fn validate_file_names(&self, batch_dir: &str, pattern: &Regex) -> Result<Vec<FileRecord>> {
        let paths = match self.storage.list(batch_dir).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => {
                return Err(PipelineError::InputBatch(format!(
                    "batch directory not found or otherwise empty: {}",
                    batch_dir
                )))
            }
        };
        let mut records = Vec::with_capacity(paths.len());
        let mut accepted = 0u64;
        let mut rejected = 0u64;
        for path in paths {
            let name = file_name(&path);
            let partition = if pattern.is_match(name) {
                self.storage.copy(&path, &format!("{}/{}", self.good_prefix, name)).await?;
                accepted += 1;
                info!(file = name, "valid file name, copied to good data partition");
                Partition::Good
            } else {
                self.storage.copy(&path, &format!("{}/{}", self.bad_prefix, name)).await?;
                rejected += 1;
                warn!(file = name, "invalid file name, copied to bad data partition");
                Partition::Bad
            };
            records.push(FileRecord { path, partition });
        }
        metrics::validation::files_accepted(accepted);
        metrics::validation::files_rejected(rejected);
        Ok(records)
    }

    /// Moves good files whose contents cannot be parsed, hold zero rows or
    /// declare the wrong column count to the bad partition.
    pub async fn validate_column_count(&self, expected_columns: usize) -> Result<()> {
        self.for_each_good_file(|frame| {
            if frame.column_count() != expected_columns {
                Some(format!(
                    "{} columns, schema declares {}",
                    frame.column_count(),
                    expected_columns
                ))
            } else {
                None
            }
        })
        .await
    }

    /// Moves good files with at least one entirely missing column to the bad
    /// partition; such a column makes the file unusable for training.
    pub async fn validate_no_empty_columns(&self) -> Result<()> {
        self.for_each_good_file(|frame| {
            (0..frame.column_count())
                .find(|&idx| frame.column_is_all_missing(idx))
                .map(|idx| format!("column {} has all values missing", idx))
        })
        .await
    }

    /// Shared walk over the good partition: files that fail to parse or hold
    /// zero rows move to bad; otherwise `check` may veto them with a reason.
    async fn for_each_good_file<F>(&self, check: F) -> Result<()>
    where
        F: Fn(&Frame) -> Option<String>,
    {
        let paths = match self.storage.list(&self.good_prefix).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => {
                return Err(PipelineError::InputBatch(format!(
                    "good data partition not found or otherwise empty: {}",
                    self.good_prefix
                )))
            }
        };
        for path in paths {
            let name = file_name(&path).to_string();
            let bytes = match self.storage.read(&path).await? {
                Lookup::Found(bytes) => bytes,
                Lookup::Missing => continue,
            };
            let reason = match Frame::from_csv_bytes(&bytes) {
                Ok(frame) if frame.is_empty() => Some("file holds no rows".to_string()),
                Ok(frame) => check(&frame),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = reason {
                self.storage
                    .rename(&path, &format!("{}/{}", self.bad_prefix, name))
                    .await?;
                metrics::validation::files_rejected(1);
                warn!(file = %name, %reason, "file moved to bad data partition");
            }
        }
        Ok(())
    }

    /// Moves leftover bad data to a run-timestamped archive so it can be
    /// returned to the client. Nothing to archive is not an error.
    pub async fn archive_bad_data(&self, archive_prefix: &str) -> Result<String> {
        let now = Utc::now();
        let archive_dir = format!(
            "{}/bad_data_{}_{}",
            archive_prefix,
            now.format("%Y-%m-%d"),
            now.format("%H%M%S")
        );
        let paths = match self.storage.list(&self.bad_prefix).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => {
                info!("bad data partition empty, nothing to archive");
                return Ok(archive_dir);
            }
        };
        for path in &paths {
            let name = file_name(path);
            self.storage
                .rename(path, &format!("{}/{}", archive_dir, name))
                .await?;
        }
        info!(count = paths.len(), archive = %archive_dir, "bad data moved to archive");
        Ok(archive_dir)
    }
}
