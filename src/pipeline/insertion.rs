use std::sync::Arc;
use tracing::info;

use crate::app::ports::{DocumentStorePort, StoragePort};
use crate::domain::Lookup;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::frame::Frame;

/// Moves validated data from the good partition into the document store and
/// back out as a single consolidated CSV.
pub struct DataInserter {
    storage: Arc<dyn StoragePort>,
    docs: Arc<dyn DocumentStorePort>,
    good_prefix: String,
}

impl DataInserter {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        docs: Arc<dyn DocumentStorePort>,
        good_prefix: String,
    ) -> Self {
        Self {
            storage,
            docs,
            good_prefix,
        }
    }

    /// Recreates the collection and inserts every good file's rows. Files
    /// here already passed validation, so a parse failure is fatal rather
    /// than a reason to re-partition.
    pub async fn insert_good_data(&self, collection: &str, unique_index: Option<&str>) -> Result<usize> {
        self.docs.create_collection(collection, unique_index).await?;
        let paths = match self.storage.list(&self.good_prefix).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => {
                return Err(PipelineError::InputBatch(format!(
                    "no validated data to insert from {}",
                    self.good_prefix
                )))
            }
        };
        let mut inserted = 0usize;
        for path in paths {
            let bytes = match self.storage.read(&path).await? {
                Lookup::Found(bytes) => bytes,
                Lookup::Missing => continue,
            };
            let frame = Frame::from_csv_bytes(&bytes)?;
            let records = frame.to_records();
            self.docs.insert_records(collection, &records).await?;
            inserted += records.len();
            info!(file = %path, rows = records.len(), collection, "rows inserted");
        }
        metrics::insertion::rows_inserted(inserted as u64);
        Ok(inserted)
    }

    /// Exports the whole collection to one CSV at `dest`, the file the model
    /// stages consume. An absent or empty collection is a collaborator error.
    pub async fn export_collection_to_csv(&self, collection: &str, dest: &str) -> Result<usize> {
        let records = match self.docs.fetch_all(collection).await? {
            Lookup::Found(records) => records,
            Lookup::Missing => {
                return Err(PipelineError::Database(format!(
                    "collection {} is absent or empty, nothing to export",
                    collection
                )))
            }
        };
        let frame = Frame::from_records(&records)?;
        self.storage.write(dest, &frame.to_csv_bytes()?).await?;
        info!(collection, dest, rows = frame.row_count(), "collection exported to csv");
        Ok(frame.row_count())
    }
}
