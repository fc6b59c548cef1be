use std::sync::Arc;

use crate::app::ports::StoragePort;
use crate::domain::Lookup;
use crate::error::{PipelineError, Result};
use crate::pipeline::frame::Frame;

/// Reads the consolidated CSV an ingestion run exported. The model stages
/// start here.
pub async fn load_exported_frame(storage: &Arc<dyn StoragePort>, path: &str) -> Result<Frame> {
    let bytes = match storage.read(path).await? {
        Lookup::Found(bytes) => bytes,
        Lookup::Missing => {
            return Err(PipelineError::InputBatch(format!(
                "exported data file does not exist, run ingestion first: {}",
                path
            )))
        }
    };
    Frame::from_csv_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory::InMemoryStorage;

    #[tokio::test]
    async fn loads_exported_csv() {
        let storage = InMemoryStorage::new();
        storage.seed("export/input.csv", b"Wafer,s1\n801,1.5\n");
        let storage: Arc<dyn StoragePort> = Arc::new(storage);
        let frame = load_exported_frame(&storage, "export/input.csv").await.unwrap();
        assert_eq!(frame.row_count(), 1);
    }

    #[tokio::test]
    async fn missing_export_is_an_input_error() {
        let storage: Arc<dyn StoragePort> = Arc::new(InMemoryStorage::new());
        let err = load_exported_frame(&storage, "export/input.csv").await.unwrap_err();
        assert!(matches!(err, PipelineError::InputBatch(_)));
    }
}
