use ndarray::Axis;
use std::sync::Arc;
use tracing::info;

use crate::app::ports::StoragePort;
use crate::config::PipelineConfig;
use crate::domain::{ModelFamily, ModelKey};
use crate::error::{PipelineError, Result};
use crate::models::registry::{ModelArtifact, ModelRegistry};
use crate::models::selection::ModelSelector;
use crate::observability::metrics;
use crate::pipeline::clustering::{elbow_plot_svg, ClusterCountSelector, KMeansPartitioner, CLUSTERING_SEED};
use crate::pipeline::loading::load_exported_frame;
use crate::pipeline::preprocessing::{parse_labels, prepare_features, FeatureMatrix};

const WAFER_COLUMN: &str = "Wafer";
const LABEL_COLUMN: &str = "Good/Bad";

/// Outcome of one training run: the discovered cluster count and the winning
/// family per cluster.
#[derive(Debug)]
pub struct TrainingReport {
    pub clusters: usize,
    pub models: Vec<(usize, ModelFamily)>,
}

/// Trains the full model set from the exported training data: discover the
/// cluster count, persist the clusterer, then run the per-cluster model
/// competition and persist each winner.
pub struct TrainingUseCase {
    storage: Arc<dyn StoragePort>,
    registry: ModelRegistry,
    selector: ModelSelector,
    export_path: String,
    elbow_plot_path: String,
}

impl TrainingUseCase {
    pub fn new(storage: Arc<dyn StoragePort>, config: &PipelineConfig) -> Self {
        let registry = ModelRegistry::new(storage.clone(), config.model_dir.clone());
        Self {
            storage,
            registry,
            selector: ModelSelector::default(),
            export_path: config.training.export_path.clone(),
            elbow_plot_path: config.elbow_plot_path.clone(),
        }
    }

    pub fn with_selector(mut self, selector: ModelSelector) -> Self {
        self.selector = selector;
        self
    }

    pub async fn run(&self) -> Result<TrainingReport> {
        info!("🧠 training run starting");
        let frame = load_exported_frame(&self.storage, &self.export_path).await?;
        let labels = frame
            .column(LABEL_COLUMN)
            .ok_or_else(|| PipelineError::Tabular(format!("column {} is absent", LABEL_COLUMN)))?;
        let y = parse_labels(&labels)?;
        let (names, x) = frame.numeric_matrix(&[WAFER_COLUMN, LABEL_COLUMN])?;
        let features = prepare_features(FeatureMatrix::new(names, x))?;

        let (k, wcss) = ClusterCountSelector::default().select(&features.x)?;
        self.storage
            .write(&self.elbow_plot_path, elbow_plot_svg(&wcss).as_bytes())
            .await?;
        let partitioner = KMeansPartitioner::fit(&features.x, k, CLUSTERING_SEED)?;
        let assignments = partitioner.assign(&features.x)?;
        self.registry
            .save(&ModelKey::Clusterer, &ModelArtifact::Clusterer(partitioner))
            .await?;

        let mut clusters: Vec<usize> = assignments.iter().copied().collect();
        clusters.sort_unstable();
        clusters.dedup();
        let mut models = Vec::with_capacity(clusters.len());
        for cluster_id in clusters {
            let member_rows: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == cluster_id)
                .map(|(i, _)| i)
                .collect();
            let x_cluster = features.x.select(Axis(0), &member_rows);
            let y_cluster = ndarray::Array1::from_vec(member_rows.iter().map(|&i| y[i]).collect());
            let (score, classifier) = self
                .selector
                .select_best_model(&x_cluster, &y_cluster, cluster_id)?;
            let family = classifier.family();
            let artifact = match classifier {
                crate::models::TrainedClassifier::RandomForest(model) => {
                    ModelArtifact::RandomForest(model)
                }
                crate::models::TrainedClassifier::XGBoost(model) => ModelArtifact::XGBoost(model),
            };
            self.registry
                .save(&ModelKey::classifier(family, cluster_id), &artifact)
                .await?;
            info!(cluster_id, %family, score, "cluster model persisted");
            models.push((cluster_id, family));
        }
        metrics::training::models_trained(models.len() as u64);
        info!(k, models = models.len(), "✅ training run finished");
        Ok(TrainingReport { clusters: k, models })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Lookup;
    use crate::infra::in_memory::InMemoryStorage;
    use crate::models::forest::{FeatureSubset, RandomForestParams};
    use crate::models::boosting::GradientBoostParams;
    use crate::models::selection::SearchConfig;
    use crate::models::tree::SplitCriterion;

    /// Two far-apart clusters of 40 rows each, labels separable inside each
    /// cluster by the second feature.
    fn seeded_storage() -> Arc<InMemoryStorage> {
        let storage = InMemoryStorage::new();
        let mut csv = String::from("Wafer,s1,s2,Good/Bad\n");
        let mut wafer = 800;
        for &center in &[0.0, 100.0] {
            for i in 0..40 {
                let s1 = center + (i % 10) as f64 * 0.1;
                let s2 = if i % 2 == 0 { 0.0 } else { 10.0 };
                let label = if i % 2 == 0 { -1 } else { 1 };
                csv.push_str(&format!("{},{},{},{}\n", wafer, s1, s2, label));
                wafer += 1;
            }
        }
        storage.seed(
            "training_file_from_db/input_file_for_training.csv",
            csv.as_bytes(),
        );
        Arc::new(storage)
    }

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

    #[tokio::test]
    async fn trains_one_model_per_cluster_and_persists_artifacts() {
        let storage = seeded_storage();
        let config = PipelineConfig::default();
        let use_case = TrainingUseCase::new(storage.clone() as Arc<dyn StoragePort>, &config)
            .with_selector(fast_selector());
        let report = use_case.run().await.unwrap();
        assert_eq!(report.clusters, 2);
        assert_eq!(report.models.len(), 2);

        // Clusterer under the reserved name, one classifier per cluster.
        assert!(storage.exists("models/KMeans/KMeans.json").await.unwrap());
        for (cluster_id, family) in &report.models {
            let name = format!("{}{}", family, cluster_id);
            assert!(storage
                .exists(&format!("models/{}/{}.json", name, name))
                .await
                .unwrap());
        }
        assert!(storage.exists("elbow_plot.svg").await.unwrap());
    }

    #[tokio::test]
    async fn persisted_clusterer_is_loadable() {
        let storage = seeded_storage();
        let config = PipelineConfig::default();
        TrainingUseCase::new(storage.clone() as Arc<dyn StoragePort>, &config)
            .with_selector(fast_selector())
            .run()
            .await
            .unwrap();
        let registry = ModelRegistry::new(storage as Arc<dyn StoragePort>, "models".to_string());
        let loaded = registry.load(&ModelKey::Clusterer).await.unwrap();
        assert!(matches!(loaded, Lookup::Found(ModelArtifact::Clusterer(_))));
    }

    #[tokio::test]
    async fn missing_export_is_an_input_error() {
        let storage: Arc<dyn StoragePort> = Arc::new(InMemoryStorage::new());
        let config = PipelineConfig::default();
        let err = TrainingUseCase::new(storage, &config).run().await.unwrap_err();
        assert_eq!(err.kind(), "input");
    }
}
