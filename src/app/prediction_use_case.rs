use std::sync::Arc;
use tracing::info;

use crate::app::ports::StoragePort;
use crate::config::PipelineConfig;
use crate::domain::{Lookup, Prediction};
use crate::error::{PipelineError, Result};
use crate::models::registry::{ModelArtifact, ModelRegistry};
use crate::observability::metrics;
use crate::pipeline::loading::load_exported_frame;
use crate::pipeline::prediction::PredictionRouter;
use crate::pipeline::preprocessing::{prepare_features, FeatureMatrix};

const WAFER_COLUMN: &str = "Wafer";
const SAMPLE_ROWS: usize = 5;

/// Outcome of one prediction run: where the results landed plus a small
/// sample for the service response.
#[derive(Debug)]
pub struct PredictionReport {
    pub output_path: String,
    pub total: usize,
    pub sample: Vec<Prediction>,
}

/// Scores the exported prediction data with the persisted clusterer and the
/// per-cluster classifiers, writing one consolidated result CSV.
pub struct PredictionUseCase {
    storage: Arc<dyn StoragePort>,
    registry: ModelRegistry,
    export_path: String,
    output_path: String,
}

impl PredictionUseCase {
    pub fn new(storage: Arc<dyn StoragePort>, config: &PipelineConfig) -> Self {
        let registry = ModelRegistry::new(storage.clone(), config.model_dir.clone());
        Self {
            storage,
            registry,
            export_path: config.prediction.export_path.clone(),
            output_path: config.prediction_output_path.clone(),
        }
    }

    pub async fn run(&self) -> Result<PredictionReport> {
        info!("🔮 prediction run starting");
        let frame = load_exported_frame(&self.storage, &self.export_path).await?;
        let wafer_ids = frame
            .column(WAFER_COLUMN)
            .ok_or_else(|| PipelineError::Tabular(format!("column {} is absent", WAFER_COLUMN)))?
            .iter()
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| PipelineError::Tabular(format!("wafer id is not numeric: {}", v)))
            })
            .collect::<Result<Vec<i64>>>()?;
        let (names, x) = frame.numeric_matrix(&[WAFER_COLUMN])?;
        let features = prepare_features(FeatureMatrix::new(names, x))?;

        let partitioner = match self.registry.load(&crate::domain::ModelKey::Clusterer).await? {
            Lookup::Found(ModelArtifact::Clusterer(partitioner)) => partitioner,
            _ => return Err(PipelineError::ClustererNotFound),
        };
        let assignments = partitioner.assign(&features.x)?;

        let router = PredictionRouter::new(self.registry.clone());
        let predictions = router.route(&features.x, &wafer_ids, &assignments).await?;
        self.storage
            .write(&self.output_path, &render_csv(&predictions)?)
            .await?;

        metrics::prediction::rows_scored(predictions.len() as u64);
        info!(
            rows = predictions.len(),
            output = %self.output_path,
            "✅ prediction run finished"
        );
        Ok(PredictionReport {
            output_path: self.output_path.clone(),
            total: predictions.len(),
            sample: predictions.into_iter().take(SAMPLE_ROWS).collect(),
        })
    }
}

fn render_csv(predictions: &[Prediction]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for prediction in predictions {
        writer
            .serialize(prediction)
            .map_err(|e| PipelineError::Tabular(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Tabular(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelFamily, ModelKey};
    use crate::infra::in_memory::InMemoryStorage;
    use crate::models::boosting::{GradientBoostModel, GradientBoostParams};
    use crate::pipeline::clustering::{KMeansPartitioner, CLUSTERING_SEED};
    use crate::pipeline::frame::Frame;
    use ndarray::array;

    /// Registry with a two-cluster partitioner and one boosting model per
    /// cluster: cluster around 0 flags everything bad, cluster around 100
    /// flags everything good.
    async fn seeded_models(storage: &Arc<InMemoryStorage>) {
        let registry = ModelRegistry::new(
            storage.clone() as Arc<dyn StoragePort>,
            "models".to_string(),
        );
        let x = array![[0.0, 0.0], [1.0, 1.0], [100.0, 0.0], [101.0, 1.0]];
        let partitioner = KMeansPartitioner::fit(&x, 2, CLUSTERING_SEED).unwrap();
        let low_cluster = partitioner.assign(&array![[0.5, 0.5]]).unwrap()[0];
        let high_cluster = partitioner.assign(&array![[100.5, 0.5]]).unwrap()[0];
        registry
            .save(&ModelKey::Clusterer, &ModelArtifact::Clusterer(partitioner))
            .await
            .unwrap();
        let params = GradientBoostParams {
            learning_rate: 0.5,
            max_depth: 2,
            n_estimators: 5,
        };
        let all_bad =
            GradientBoostModel::fit(&array![[0.0, 0.0], [1.0, 1.0]], &array![-1.0, -1.0], params)
                .unwrap();
        let all_good = GradientBoostModel::fit(
            &array![[100.0, 0.0], [101.0, 1.0]],
            &array![1.0, 1.0],
            params,
        )
        .unwrap();
        registry
            .save(
                &ModelKey::classifier(ModelFamily::XGBoost, low_cluster),
                &ModelArtifact::XGBoost(all_bad),
            )
            .await
            .unwrap();
        registry
            .save(
                &ModelKey::classifier(ModelFamily::XGBoost, high_cluster),
                &ModelArtifact::XGBoost(all_good),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scores_rows_and_writes_sorted_output() {
        let storage = Arc::new(InMemoryStorage::new());
        seeded_models(&storage).await;
        storage.seed(
            "prediction_file_from_db/input_file_for_prediction.csv",
            b"Wafer,s1,s2\n804,100.2,0.4\n801,0.3,0.6\n803,0.7,0.4\n802,100.8,0.6\n",
        );
        let config = PipelineConfig::default();
        let use_case = PredictionUseCase::new(storage.clone() as Arc<dyn StoragePort>, &config);
        let report = use_case.run().await.unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.output_path, "prediction_results/predictions.csv");

        let bytes = storage
            .read("prediction_results/predictions.csv")
            .await
            .unwrap()
            .into_option()
            .unwrap();
        let frame = Frame::from_csv_bytes(&bytes).unwrap();
        assert_eq!(frame.columns, vec!["Wafer", "Output"]);
        let ids: Vec<&str> = frame.column("Wafer").unwrap();
        assert_eq!(ids, vec!["801", "802", "803", "804"]);
        let outputs: Vec<&str> = frame.column("Output").unwrap();
        assert_eq!(outputs, vec!["-1", "1", "-1", "1"]);
        assert_eq!(report.sample.len(), 4);
    }

    /// Full loop on in-memory adapters: ingest a training batch, train,
    /// ingest a prediction batch, predict.
    #[tokio::test]
    async fn trained_models_score_a_fresh_batch() {
        use crate::app::ingestion_use_case::{IngestionParams, IngestionUseCase};
        use crate::app::ports::DocumentStorePort;
        use crate::app::training_use_case::TrainingUseCase;
        use crate::infra::in_memory::InMemoryDocumentStore;
        use crate::models::forest::{FeatureSubset, RandomForestParams};
        use crate::models::selection::{ModelSelector, SearchConfig};
        use crate::models::tree::SplitCriterion;

        let storage = Arc::new(InMemoryStorage::new());
        let docs = Arc::new(InMemoryDocumentStore::new());
        // The prediction batch carries no label column.
        storage.seed(
            "schema_training.json",
            br#"{"LengthOfDateStampInFile": 8, "LengthOfTimeStampInFile": 6, "NumberOfColumns": 4}"#,
        );
        storage.seed(
            "schema_prediction.json",
            br#"{"LengthOfDateStampInFile": 8, "LengthOfTimeStampInFile": 6, "NumberOfColumns": 3}"#,
        );

        let mut train_csv = String::from(",s1,s2,Good/Bad\n");
        let mut wafer = 100;
        for &center in &[0.0, 100.0] {
            for i in 0..40 {
                let s1 = center + (i % 10) as f64 * 0.1;
                let (s2, label) = if i % 2 == 0 { (0.0, -1) } else { (10.0, 1) };
                train_csv.push_str(&format!("Wafer-{},{},{},{}\n", wafer, s1, s2, label));
                wafer += 1;
            }
        }
        storage.seed("train_batch/wafer_20231001_120000.csv", train_csv.as_bytes());
        storage.seed(
            "predict_batch/wafer_20231002_120000.csv",
            b",s1,s2\nWafer-901,0.5,0.0\nWafer-902,100.5,10.0\n",
        );

        let config = PipelineConfig::default();
        IngestionUseCase::new(
            storage.clone() as Arc<dyn StoragePort>,
            docs.clone() as Arc<dyn DocumentStorePort>,
            IngestionParams::training(&config),
        )
        .run("train_batch")
        .await
        .unwrap();
        let selector = ModelSelector::new(SearchConfig {
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
        });
        TrainingUseCase::new(storage.clone() as Arc<dyn StoragePort>, &config)
            .with_selector(selector)
            .run()
            .await
            .unwrap();
        IngestionUseCase::new(
            storage.clone() as Arc<dyn StoragePort>,
            docs as Arc<dyn DocumentStorePort>,
            IngestionParams::prediction(&config),
        )
        .run("predict_batch")
        .await
        .unwrap();
        let report = PredictionUseCase::new(storage.clone() as Arc<dyn StoragePort>, &config)
            .run()
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        let bytes = storage
            .read(&report.output_path)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        let frame = Frame::from_csv_bytes(&bytes).unwrap();
        assert_eq!(frame.column("Wafer").unwrap(), vec!["901", "902"]);
        assert_eq!(frame.column("Output").unwrap(), vec!["-1", "1"]);
    }

    #[tokio::test]
    async fn missing_clusterer_is_fatal() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.seed(
            "prediction_file_from_db/input_file_for_prediction.csv",
            b"Wafer,s1,s2\n801,0.3,0.5\n",
        );
        let config = PipelineConfig::default();
        let err = PredictionUseCase::new(storage as Arc<dyn StoragePort>, &config)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ClustererNotFound));
    }
}
