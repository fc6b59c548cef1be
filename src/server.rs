use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::app::ingestion_use_case::{IngestionParams, IngestionUseCase};
use crate::app::ports::{DocumentStorePort, StoragePort};
use crate::app::prediction_use_case::PredictionUseCase;
use crate::app::training_use_case::TrainingUseCase;
use crate::config::PipelineConfig;
use crate::domain::Prediction;
use crate::error::PipelineError;
use crate::observability::metrics;

/// Shared handler state: the configuration and the two storage ports.
#[derive(Clone)]
pub struct AppState {
    pub config: PipelineConfig,
    pub storage: Arc<dyn StoragePort>,
    pub docs: Arc<dyn DocumentStorePort>,
}

#[derive(Deserialize)]
pub struct PredictRequest {
    /// Batch directory to ingest before scoring.
    pub filepath: String,
}

#[derive(Serialize)]
pub struct TrainResponse {
    pub status: &'static str,
    pub clusters: usize,
    pub models: Vec<String>,
}

#[derive(Serialize)]
pub struct PredictResponse {
    pub status: &'static str,
    pub output_path: String,
    pub total: usize,
    pub sample: Vec<Prediction>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub kind: &'static str,
    pub message: String,
}

/// Maps pipeline errors onto HTTP responses: bad input is the client's
/// problem, everything else is ours.
fn error_response(err: PipelineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        PipelineError::InputBatch(_) | PipelineError::Tabular(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(kind = err.kind(), %err, "request failed");
    (
        status,
        Json(ErrorResponse {
            status: "error",
            kind: err.kind(),
            message: err.to_string(),
        }),
    )
}

async fn health() -> impl IntoResponse {
    "OK"
}

/// POST /train: ingest the configured training batch, then train and persist
/// the full model set.
async fn train(State(state): State<AppState>) -> impl IntoResponse {
    let ingestion = IngestionUseCase::new(
        state.storage.clone(),
        state.docs.clone(),
        IngestionParams::training(&state.config),
    );
    if let Err(err) = ingestion.run(&state.config.training_batch_dir).await {
        metrics::training::run_error();
        return error_response(err).into_response();
    }
    match TrainingUseCase::new(state.storage.clone(), &state.config).run().await {
        Ok(report) => {
            metrics::training::run_success();
            Json(TrainResponse {
                status: "ok",
                clusters: report.clusters,
                models: report
                    .models
                    .iter()
                    .map(|(cluster_id, family)| format!("{}{}", family, cluster_id))
                    .collect(),
            })
            .into_response()
        }
        Err(err) => {
            metrics::training::run_error();
            error_response(err).into_response()
        }
    }
}

/// POST /predict: ingest the batch named in the request, then score it with
/// the persisted models.
async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    let ingestion = IngestionUseCase::new(
        state.storage.clone(),
        state.docs.clone(),
        IngestionParams::prediction(&state.config),
    );
    if let Err(err) = ingestion.run(&request.filepath).await {
        metrics::prediction::run_error();
        return error_response(err).into_response();
    }
    match PredictionUseCase::new(state.storage.clone(), &state.config).run().await {
        Ok(report) => {
            metrics::prediction::run_success();
            Json(PredictResponse {
                status: "ok",
                output_path: report.output_path,
                total: report.total,
                sample: report.sample,
            })
            .into_response()
        }
        Err(err) => {
            metrics::prediction::run_error();
            error_response(err).into_response()
        }
    }
}

/// Create the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/train", post(train))
        .route("/predict", post(predict))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let port = state.config.port;
    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", port);

    println!("🚀 HTTP server running on http://{}", addr);
    println!("💚 Health check: http://{}/health", addr);
    println!("🧠 Train:        POST http://{}/train", addr);
    println!("🔮 Predict:      POST http://{}/predict", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_unprocessable_entity() {
        let (status, Json(body)) =
            error_response(PipelineError::InputBatch("no such batch".to_string()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.kind, "input");
        assert_eq!(body.status, "error");
    }

    #[test]
    fn pipeline_failures_map_to_internal_error_with_their_kind() {
        let cases: Vec<(PipelineError, &str)> = vec![
            (PipelineError::ClustererNotFound, "clustering"),
            (PipelineError::ModelNotFound { cluster_id: 3 }, "model"),
            (PipelineError::Schema("bad schema".to_string()), "configuration"),
            (PipelineError::Database("down".to_string()), "collaborator"),
        ];
        for (err, kind) in cases {
            let (status, Json(body)) = error_response(err);
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body.kind, kind);
        }
    }
}
