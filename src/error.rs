use thiserror::Error;

/// Error taxonomy for the whole pipeline.
///
/// File-level structural problems are never surfaced here; the validator
/// absorbs them into the good/bad partitioning. Everything below aborts the
/// remainder of the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("input batch error: {0}")]
    InputBatch(String),

    #[error("no knee found in the WCSS curve: {0}")]
    NoKnee(String),

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("clustering model not found in the registry")]
    ClustererNotFound,

    #[error("no model artifact found for cluster {cluster_id}")]
    ModelNotFound { cluster_id: usize },

    #[error("cluster {cluster_id} has {rows} rows, fewer than the {folds} cross-validation folds")]
    InsufficientClusterRows {
        cluster_id: usize,
        rows: usize,
        folds: usize,
    },

    #[error("tabular data error: {0}")]
    Tabular(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable kind label reported at the service boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema(_) => "configuration",
            PipelineError::InputBatch(_) => "input",
            PipelineError::NoKnee(_) | PipelineError::Clustering(_) | PipelineError::ClustererNotFound => "clustering",
            PipelineError::ModelNotFound { .. } | PipelineError::InsufficientClusterRows { .. } => "model",
            PipelineError::Tabular(_) => "input",
            PipelineError::Storage(_) | PipelineError::Database(_) | PipelineError::Io(_) | PipelineError::Json(_) => {
                "collaborator"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
