use std::env;

/// Well-known storage paths and prefixes for one pipeline mode.
///
/// Training and prediction run against independent prefixes so a training
/// batch can never shadow a prediction batch.
#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub schema_path: String,
    pub good_prefix: String,
    pub bad_prefix: String,
    pub archive_prefix: String,
    pub collection: String,
    pub export_path: String,
}

/// Pipeline configuration, threaded explicitly through every component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for the filesystem storage adapter.
    pub storage_root: String,
    /// Path of the SQLite document store.
    pub database_path: String,
    /// Default batch location for training runs.
    pub training_batch_dir: String,
    pub training: ModeConfig,
    pub prediction: ModeConfig,
    pub model_dir: String,
    pub elbow_plot_path: String,
    pub prediction_output_path: String,
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: "data".to_string(),
            database_path: "data/wafer.db".to_string(),
            training_batch_dir: "training_batch_files".to_string(),
            training: ModeConfig {
                schema_path: "schema_training.json".to_string(),
                good_prefix: "training_data_validated/good_data".to_string(),
                bad_prefix: "training_data_validated/bad_data".to_string(),
                archive_prefix: "training_data_archive".to_string(),
                collection: "training_data".to_string(),
                export_path: "training_file_from_db/input_file_for_training.csv".to_string(),
            },
            prediction: ModeConfig {
                schema_path: "schema_prediction.json".to_string(),
                good_prefix: "prediction_data_validated/good_data".to_string(),
                bad_prefix: "prediction_data_validated/bad_data".to_string(),
                archive_prefix: "prediction_data_archive".to_string(),
                collection: "prediction_data".to_string(),
                export_path: "prediction_file_from_db/input_file_for_prediction.csv".to_string(),
            },
            model_dir: "models".to_string(),
            elbow_plot_path: "elbow_plot.svg".to_string(),
            prediction_output_path: "prediction_results/predictions.csv".to_string(),
            port: 5000,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment variables where set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = env::var("WAFER_STORAGE_ROOT") {
            config.storage_root = root;
        }
        if let Ok(db) = env::var("WAFER_DATABASE_PATH") {
            config.database_path = db;
        }
        if let Ok(batch) = env::var("WAFER_TRAINING_BATCH_DIR") {
            config.training_batch_dir = batch;
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        config
    }
}
