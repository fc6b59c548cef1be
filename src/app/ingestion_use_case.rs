use std::sync::Arc;
use tracing::info;

use crate::app::ports::{DocumentStorePort, StoragePort};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::insertion::DataInserter;
use crate::pipeline::schema::read_schema;
use crate::pipeline::transform::ContentNormalizer;
use crate::pipeline::validation::{file_name_pattern, FileValidator};

/// Row identifier column, the unique index of both collections.
const UNIQUE_INDEX: &str = "Wafer";

/// Paths and names that differ between a training and a prediction ingestion
/// run. The stage sequence itself is identical.
#[derive(Debug, Clone)]
pub struct IngestionParams {
    pub schema_path: String,
    pub good_prefix: String,
    pub bad_prefix: String,
    pub archive_prefix: String,
    pub collection: String,
    pub export_path: String,
}

impl IngestionParams {
    pub fn training(config: &PipelineConfig) -> Self {
        Self::from_mode(&config.training)
    }

    pub fn prediction(config: &PipelineConfig) -> Self {
        Self::from_mode(&config.prediction)
    }

    fn from_mode(mode: &crate::config::ModeConfig) -> Self {
        Self {
            schema_path: mode.schema_path.clone(),
            good_prefix: mode.good_prefix.clone(),
            bad_prefix: mode.bad_prefix.clone(),
            archive_prefix: mode.archive_prefix.clone(),
            collection: mode.collection.clone(),
            export_path: mode.export_path.clone(),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct IngestionReport {
    pub files_seen: usize,
    pub rows_inserted: usize,
    pub rows_exported: usize,
    pub archive_dir: String,
}

/// Drives one raw batch through validation, normalization, database
/// insertion and export. Both service operations start here.
pub struct IngestionUseCase {
    storage: Arc<dyn StoragePort>,
    docs: Arc<dyn DocumentStorePort>,
    params: IngestionParams,
}

impl IngestionUseCase {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        docs: Arc<dyn DocumentStorePort>,
        params: IngestionParams,
    ) -> Self {
        Self {
            storage,
            docs,
            params,
        }
    }

    pub async fn run(&self, batch_dir: &str) -> Result<IngestionReport> {
        info!(batch_dir, collection = %self.params.collection, "🚚 ingestion run starting");
        let validator = FileValidator::new(
            self.storage.clone(),
            self.params.good_prefix.clone(),
            self.params.bad_prefix.clone(),
        );
        validator.clear_partitions().await?;

        let schema = read_schema(&self.storage, &self.params.schema_path).await?;
        let pattern = file_name_pattern(&schema)?;
        let records = validator.validate_file_names(batch_dir, &pattern).await?;
        validator.validate_column_count(schema.column_count).await?;
        validator.validate_no_empty_columns().await?;

        let normalizer = ContentNormalizer::new(
            self.storage.clone(),
            self.params.good_prefix.clone(),
            self.params.bad_prefix.clone(),
        );
        normalizer.replace_missing_with_null().await?;
        normalizer.format_wafer_column().await?;

        let inserter = DataInserter::new(
            self.storage.clone(),
            self.docs.clone(),
            self.params.good_prefix.clone(),
        );
        let rows_inserted = inserter
            .insert_good_data(&self.params.collection, Some(UNIQUE_INDEX))
            .await?;
        // The collection is now authoritative, the partition has served its
        // purpose.
        self.storage.delete_prefix(&self.params.good_prefix).await?;
        let rows_exported = inserter
            .export_collection_to_csv(&self.params.collection, &self.params.export_path)
            .await?;
        let archive_dir = validator.archive_bad_data(&self.params.archive_prefix).await?;

        info!(
            files = records.len(),
            rows_inserted,
            rows_exported,
            "✅ ingestion run finished"
        );
        Ok(IngestionReport {
            files_seen: records.len(),
            rows_inserted,
            rows_exported,
            archive_dir,
        })
    }
}
