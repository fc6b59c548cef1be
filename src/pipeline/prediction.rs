use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::domain::{Lookup, Prediction};
use crate::error::{PipelineError, Result};
use crate::models::registry::ModelRegistry;

/// Routes each row to the classifier of its cluster and merges the scores
/// into one output, ordered by row identifier.
pub struct PredictionRouter {
    registry: ModelRegistry,
}

impl PredictionRouter {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub async fn route(
        &self,
        x: &Array2<f64>,
        wafer_ids: &[i64],
        assignments: &Array1<usize>,
    ) -> Result<Vec<Prediction>> {
        let mut clusters: Vec<usize> = assignments.iter().copied().collect();
        clusters.sort_unstable();
        clusters.dedup();
        let mut predictions = Vec::with_capacity(x.nrows());
        for cluster_id in clusters {
            let artifact = match self.registry.find_for_cluster(cluster_id).await? {
                Lookup::Found(artifact) => artifact,
                Lookup::Missing => return Err(PipelineError::ModelNotFound { cluster_id }),
            };
            let classifier = artifact
                .into_classifier()
                .ok_or(PipelineError::ModelNotFound { cluster_id })?;
            let member_rows: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == cluster_id)
                .map(|(i, _)| i)
                .collect();
            let outputs = classifier.predict(&x.select(Axis(0), &member_rows));
            info!(
                cluster_id,
                family = %classifier.family(),
                rows = member_rows.len(),
                "cluster scored"
            );
            for (&row, &output) in member_rows.iter().zip(outputs.iter()) {
                predictions.push(Prediction {
                    wafer_id: wafer_ids[row],
                    output: output as i64,
                });
            }
        }
        predictions.sort_by_key(|p| p.wafer_id);
        Ok(predictions)
    }
}
