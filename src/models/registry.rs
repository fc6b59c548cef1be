use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::ports::StoragePort;
use crate::domain::{Lookup, ModelKey};
use crate::error::Result;
use crate::pipeline::clustering::KMeansPartitioner;

/// Everything the registry knows how to persist, tagged by family so a
/// loaded artifact can never be scored as the wrong kind of model.
#[derive(Serialize, Deserialize)]
#[serde(tag = "family", content = "model")]
pub enum ModelArtifact {
    Clusterer(KMeansPartitioner),
    RandomForest(crate::models::forest::RandomForestModel),
    XGBoost(crate::models::boosting::GradientBoostModel),
}

impl ModelArtifact {
    /// The classifier inside, if this artifact is one.
    pub fn into_classifier(self) -> Option<crate::models::TrainedClassifier> {
        match self {
            ModelArtifact::Clusterer(_) => None,
            ModelArtifact::RandomForest(model) => {
                Some(crate::models::TrainedClassifier::RandomForest(model))
            }
            ModelArtifact::XGBoost(model) => {
                Some(crate::models::TrainedClassifier::XGBoost(model))
            }
        }
    }
}

/// Persists model artifacts under `<model_dir>/<name>/<name>.json` and
/// answers reverse lookups by cluster id.
#[derive(Clone)]
pub struct ModelRegistry {
    storage: Arc<dyn StoragePort>,
    model_dir: String,
}

impl ModelRegistry {
    pub fn new(storage: Arc<dyn StoragePort>, model_dir: String) -> Self {
        Self { storage, model_dir }
    }

    fn artifact_path(&self, key: &ModelKey) -> String {
        let name = key.name();
        format!("{}/{}/{}.json", self.model_dir, name, name)
    }

    /// Saves an artifact, overwriting any previous model under the same key.
    pub async fn save(&self, key: &ModelKey, artifact: &ModelArtifact) -> Result<()> {
        let path = self.artifact_path(key);
        let bytes = serde_json::to_vec(artifact)?;
        self.storage.write(&path, &bytes).await?;
        info!(%key, %path, "model artifact saved");
        Ok(())
    }

    pub async fn load(&self, key: &ModelKey) -> Result<Lookup<ModelArtifact>> {
        let path = self.artifact_path(key);
        match self.storage.read(&path).await? {
            Lookup::Found(bytes) => Ok(Lookup::Found(serde_json::from_slice(&bytes)?)),
            Lookup::Missing => Ok(Lookup::Missing),
        }
    }

    /// Finds the classifier stored for a cluster by parsing every artifact
    /// name under the model directory and matching on the cluster component.
    pub async fn find_for_cluster(&self, cluster_id: usize) -> Result<Lookup<ModelArtifact>> {
        let paths = match self.storage.list(&self.model_dir).await? {
            Lookup::Found(paths) => paths,
            Lookup::Missing => return Ok(Lookup::Missing),
        };
        for path in paths {
            // <model_dir>/<name>/<name>.json, the directory segment is the key.
            let segments: Vec<&str> = path.split('/').collect();
            let name = match segments.len().checked_sub(2).map(|i| segments[i]) {
                Some(name) => name,
                None => continue,
            };
            let key = match ModelKey::parse(name) {
                Some(key) => key,
                None => {
                    warn!(%path, "unrecognized artifact name in model directory");
                    continue;
                }
            };
            if key.cluster_id() == Some(cluster_id) {
                return self.load(&key).await;
            }
        }
        Ok(Lookup::Missing)
    }
}
