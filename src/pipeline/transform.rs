use std::sync::Arc;
use tracing::{info, warn};

use crate::app::ports::StoragePort;
use crate::domain::Lookup;
use crate::error::Result;
use crate::pipeline::frame::Frame;

/// Downstream representation of a missing cell. Chosen so the database keeps
/// an explicit marker instead of a bare empty string.
pub const MISSING_SENTINEL: &str = "NULL";

const WAFER_COLUMN: &str = "Wafer";
const UNNAMED_COLUMN: &str = "Unnamed: 0";
const WAFER_ID_PREFIX_LEN: usize = 6;

/// Content normalization of the good partition ahead of database insertion.
pub struct ContentNormalizer {
    storage: Arc<dyn StoragePort>,
    good_prefix: String,
    bad_prefix: String,
}

impl ContentNormalizer {
    pub fn new(storage: Arc<dyn StoragePort>, good_prefix: String, bad_prefix: String) -> Self {
        Self {
            storage,
            good_prefix,
            bad_prefix,
        }
    }

    /// Rewrites every empty cell as the `NULL` sentinel. Files that no longer
    /// parse at this stage move to the bad partition.
    pub async fn replace_missing_with_null(&self) -> Result<()> {
        self.rewrite_good_files("missing values replaced with sentinel", |frame| {
            for row in &mut frame.rows {
                for cell in row.iter_mut() {
                    if cell.is_empty() {
                        *cell = MISSING_SENTINEL.to_string();
                    }
                }
            }
        })
        .await
    }

    /// Names the identifier column `Wafer` and strips the constant
    /// `Wafer-` prefix from its values, leaving the bare numeric id.
    pub async fn format_wafer_column(&self) -> Result<()> {
        self.rewrite_good_files("wafer column renamed and trimmed", |frame| {
            if let Some(first) = frame.columns.first_mut() {
                if first.is_empty() || first == UNNAMED_COLUMN {
                    *first = WAFER_COLUMN.to_string();
                }
            }
            if let Some(idx) = frame.column_index(WAFER_COLUMN) {
                for row in &mut frame.rows {
                    let trimmed: String = row[idx].chars().skip(WAFER_ID_PREFIX_LEN).collect();
                    row[idx] = trimmed;
                }
            }
        })
        .await
    }

    /// Shared rewrite loop: parse, apply `edit` in place, write back. An
    /// empty good partition is benign here since validation already ran.
    async fn rewrite_good_files<F>(&self, what: &str, edit: F) -> Result<()>
    where
        F: Fn(&mut Frame),
    {
        let paths = match self.storage.list(&self.good_prefix).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => {
                info!("good data partition empty, nothing to normalize");
                return Ok(());
            }
        };
        for path in paths {
            let bytes = match self.storage.read(&path).await? {
                Lookup::Found(bytes) => bytes,
                Lookup::Missing => continue,
            };
            let mut frame = match Frame::from_csv_bytes(&bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    let name = path.rsplit('/').next().unwrap_or(&path).to_string();
                    self.storage
                        .rename(&path, &format!("{}/{}", self.bad_prefix, name))
                        .await?;
                    warn!(file = %name, reason = %e, "unparsable file moved to bad data partition");
                    continue;
                }
            };
            edit(&mut frame);
            self.storage.write(&path, &frame.to_csv_bytes()?).await?;
            info!(file = %path, "{}", what);
        }
        Ok(())
    }
}
