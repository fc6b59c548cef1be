use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use wafer_pipeline::app::ingestion_use_case::{IngestionParams, IngestionUseCase};
use wafer_pipeline::app::ports::{DocumentStorePort, StoragePort};
use wafer_pipeline::app::prediction_use_case::PredictionUseCase;
use wafer_pipeline::app::training_use_case::TrainingUseCase;
use wafer_pipeline::config::PipelineConfig;
use wafer_pipeline::infra::fs_storage::FsStorage;
use wafer_pipeline::infra::sqlite_store::SqliteDocumentStore;
use wafer_pipeline::observability::logging::init_logging;
use wafer_pipeline::server::{start_server, AppState};

#[derive(Parser)]
#[command(name = "wafer-pipeline")]
#[command(about = "Wafer fault detection pipeline: ingest sensor batches, train per-cluster models, predict")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service exposing /train and /predict
    Serve,
    /// Ingest the configured training batch and train the model set
    Train,
    /// Ingest a prediction batch and score it with the persisted models
    Predict {
        /// Batch directory (relative to the storage root) to score
        #[arg(long)]
        filepath: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    init_logging();

    let config = PipelineConfig::from_env();
    let storage: Arc<dyn StoragePort> = Arc::new(FsStorage::new(config.storage_root.clone()));
    let docs: Arc<dyn DocumentStorePort> = Arc::new(SqliteDocumentStore::open(&config.database_path)?);

    match cli.command {
        Command::Serve => {
            let state = AppState {
                config,
                storage,
                docs,
            };
            start_server(state).await?;
        }
        Command::Train => {
            let ingestion =
                IngestionUseCase::new(storage.clone(), docs, IngestionParams::training(&config));
            let ingested = ingestion.run(&config.training_batch_dir).await?;
            info!(
                files = ingested.files_seen,
                rows = ingested.rows_inserted,
                "training batch ingested"
            );
            let report = TrainingUseCase::new(storage, &config).run().await?;
            println!("✅ trained {} models over {} clusters", report.models.len(), report.clusters);
            for (cluster_id, family) in report.models {
                println!("   cluster {} -> {}", cluster_id, family);
            }
        }
        Command::Predict { filepath } => {
            let ingestion =
                IngestionUseCase::new(storage.clone(), docs, IngestionParams::prediction(&config));
            let ingested = ingestion.run(&filepath).await?;
            info!(
                files = ingested.files_seen,
                rows = ingested.rows_inserted,
                "prediction batch ingested"
            );
            let report = PredictionUseCase::new(storage, &config).run().await?;
            println!("✅ scored {} rows, results at {}", report.total, report.output_path);
            for prediction in report.sample {
                println!("   wafer {} -> {}", prediction.wafer_id, prediction.output);
            }
        }
    }

    Ok(())
}
