//! Full pipeline run against the production adapters: filesystem storage
//! under a temporary root and an in-memory SQLite database.

use std::sync::Arc;
use tempfile::TempDir;

use wafer_pipeline::app::ingestion_use_case::{IngestionParams, IngestionUseCase};
use wafer_pipeline::app::ports::{DocumentStorePort, StoragePort};
use wafer_pipeline::app::prediction_use_case::PredictionUseCase;
use wafer_pipeline::app::training_use_case::TrainingUseCase;
use wafer_pipeline::config::PipelineConfig;
use wafer_pipeline::infra::fs_storage::FsStorage;
use wafer_pipeline::infra::sqlite_store::SqliteDocumentStore;
use wafer_pipeline::models::boosting::GradientBoostParams;
use wafer_pipeline::models::forest::{FeatureSubset, RandomForestParams};
use wafer_pipeline::models::selection::{ModelSelector, SearchConfig};
use wafer_pipeline::models::tree::SplitCriterion;
use wafer_pipeline::pipeline::frame::Frame;

fn fast_selector() -> ModelSelector {
    ModelSelector::new(SearchConfig {
        test_fraction: 0.25,
        seed: 123,
        cv_folds: 5,
        rf_grid: vec![RandomForestParams {
            n_trees: 10,
            criterion: SplitCriterion::Gini,
            max_depth: 3,
            max_features: FeatureSubset::Sqrt,
        }],
        xgb_grid: vec![GradientBoostParams {
            learning_rate: 0.5,
            max_depth: 3,
            n_estimators: 10,
        }],
    })
}

/// Two clusters separated on the first sensor; inside each cluster the label
/// follows the second sensor.
fn training_batch_csv() -> String {
    let mut csv = String::from(",Sensor-1,Sensor-2,Good/Bad\n");
    let mut wafer = 500;
    for &center in &[0.0, 100.0] {
        for i in 0..40 {
            let s1 = center + (i % 10) as f64 * 0.1;
            let (s2, label) = if i % 2 == 0 { (0.0, -1) } else { (10.0, 1) };
            csv.push_str(&format!("Wafer-{},{},{},{}\n", wafer, s1, s2, label));
            wafer += 1;
        }
    }
    csv
}

#[tokio::test]
async fn train_then_predict_on_real_adapters() {
    let root = TempDir::new().unwrap();
    let storage: Arc<dyn StoragePort> = Arc::new(FsStorage::new(root.path()));
    let docs: Arc<dyn DocumentStorePort> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let config = PipelineConfig::default();

    storage
        .write(
            "schema_training.json",
            br#"{"LengthOfDateStampInFile": 8, "LengthOfTimeStampInFile": 6, "NumberOfColumns": 4}"#,
        )
        .await
        .unwrap();
    storage
        .write(
            "schema_prediction.json",
            br#"{"LengthOfDateStampInFile": 8, "LengthOfTimeStampInFile": 6, "NumberOfColumns": 3}"#,
        )
        .await
        .unwrap();
    storage
        .write(
            "training_batch_files/wafer_20230801_090000.csv",
            training_batch_csv().as_bytes(),
        )
        .await
        .unwrap();
    // A misnamed file rides along and must end up archived, not trained on.
    storage
        .write("training_batch_files/readme.txt", b"operator notes")
        .await
        .unwrap();

    let ingestion = IngestionUseCase::new(
        storage.clone(),
        docs.clone(),
        IngestionParams::training(&config),
    );
    let report = ingestion.run(&config.training_batch_dir).await.unwrap();
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.rows_inserted, 80);

    let training = TrainingUseCase::new(storage.clone(), &config).with_selector(fast_selector());
    let trained = training.run().await.unwrap();
    assert_eq!(trained.clusters, 2);
    assert_eq!(trained.models.len(), 2);
    assert!(storage.exists("models/KMeans/KMeans.json").await.unwrap());
    assert!(storage.exists("elbow_plot.svg").await.unwrap());

    storage
        .write(
            "prediction_batch/wafer_20230802_090000.csv",
            b",Sensor-1,Sensor-2\nWafer-901,0.5,0.0\nWafer-902,100.5,10.0\n",
        )
        .await
        .unwrap();
    let ingestion = IngestionUseCase::new(storage.clone(), docs, IngestionParams::prediction(&config));
    ingestion.run("prediction_batch").await.unwrap();

    let prediction = PredictionUseCase::new(storage.clone(), &config);
    let scored = prediction.run().await.unwrap();
    assert_eq!(scored.total, 2);

    let bytes = storage
        .read("prediction_results/predictions.csv")
        .await
        .unwrap()
        .into_option()
        .unwrap();
    let frame = Frame::from_csv_bytes(&bytes).unwrap();
    assert_eq!(frame.columns, vec!["Wafer", "Output"]);
    assert_eq!(frame.column("Wafer").unwrap(), vec!["901", "902"]);
    assert_eq!(frame.column("Output").unwrap(), vec!["-1", "1"]);

    // The misnamed file was archived under a timestamped prefix.
    let archived = storage.list("training_data_archive").await.unwrap().into_option().unwrap();
    assert!(archived.iter().any(|p| p.ends_with("readme.txt")));
}

#[tokio::test]
async fn predicting_without_trained_models_fails_cleanly() {
    let root = TempDir::new().unwrap();
    let storage: Arc<dyn StoragePort> = Arc::new(FsStorage::new(root.path()));
    let docs: Arc<dyn DocumentStorePort> = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let config = PipelineConfig::default();

    storage
        .write(
            "schema_prediction.json",
            br#"{"LengthOfDateStampInFile": 8, "LengthOfTimeStampInFile": 6, "NumberOfColumns": 3}"#,
        )
        .await
        .unwrap();
    storage
        .write(
            "prediction_batch/wafer_20230802_090000.csv",
            b",Sensor-1,Sensor-2\nWafer-901,0.5,0.0\nWafer-902,100.5,10.0\n",
        )
        .await
        .unwrap();

    IngestionUseCase::new(storage.clone(), docs, IngestionParams::prediction(&config))
        .run("prediction_batch")
        .await
        .unwrap();
    let err = PredictionUseCase::new(storage, &config).run().await.unwrap_err();
    assert_eq!(err.kind(), "clustering");
}
