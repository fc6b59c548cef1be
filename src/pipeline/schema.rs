use std::sync::Arc;
use tracing::info;

use crate::app::ports::StoragePort;
use crate::domain::{Lookup, Schema};
use crate::error::{PipelineError, Result};

/// Loads and validates the declared batch schema. Any problem here is fatal
/// before a single file is partitioned.
pub async fn read_schema(storage: &Arc<dyn StoragePort>, path: &str) -> Result<Schema> {
    let bytes = match storage.read(path).await? {
        Lookup::Found(bytes) => bytes,
        Lookup::Missing => {
            return Err(PipelineError::Schema(format!("schema file does not exist: {}", path)))
        }
    };
    let schema: Schema = serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::Schema(format!("malformed schema {}: {}", path, e)))?;
    if schema.column_count == 0 {
        return Err(PipelineError::Schema(format!(
            "schema {} declares zero columns",
            path
        )));
    }
    info!(
        date_stamp_length = schema.date_stamp_length,
        time_stamp_length = schema.time_stamp_length,
        column_count = schema.column_count,
        "values extracted from schema"
    );
    Ok(schema)
}
