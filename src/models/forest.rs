use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::tree::{grow_classification_tree, Node, SplitCriterion};

/// Feature-subset rule applied at every split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSubset {
    Sqrt,
    Log2,
}

impl FeatureSubset {
    pub fn resolve(&self, n_features: usize) -> usize {
        let picked = match self {
            FeatureSubset::Sqrt => (n_features as f64).sqrt().floor() as usize,
            FeatureSubset::Log2 => (n_features as f64).log2().floor() as usize,
        };
        picked.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_trees: usize,
    pub criterion: SplitCriterion,
    pub max_depth: usize,
    pub max_features: FeatureSubset,
}

/// Bagged ensemble of classification trees with per-split feature sampling.
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub params: RandomForestParams,
    classes: Vec<f64>,
    trees: Vec<Node>,
    seed: u64,
}

impl RandomForestModel {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: RandomForestParams, seed: u64) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || y.len() != n {
            return Err(PipelineError::Tabular(format!(
                "cannot fit a forest on {} rows with {} labels",
                n,
                y.len()
            )));
        }
        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        classes.dedup();
        let features_per_split = params.max_features.resolve(x.ncols());
        let mut trees = Vec::with_capacity(params.n_trees);
        for t in 0..params.n_trees {
            // One independent stream per tree keeps fits reproducible even if
            // tree construction consumes varying amounts of randomness.
            let mut rng = Xoshiro256Plus::seed_from_u64(seed.wrapping_add(t as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(grow_classification_tree(
                x,
                y,
                &classes,
                &bootstrap,
                params.criterion,
                params.max_depth,
                features_per_split,
                &mut rng,
            ));
        }
        Ok(Self {
            params,
            classes,
            trees,
            seed,
        })
    }

    /// Majority vote over the ensemble; ties resolve to the smaller label.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let predictions: Vec<f64> = x
            .outer_iter()
            .map(|row| {
                let row: Vec<f64> = row.to_vec();
                let mut votes = vec![0usize; self.classes.len()];
                for tree in &self.trees {
                    let label = tree.evaluate(&row);
                    if let Some(pos) = self.classes.iter().position(|&c| c == label) {
                        votes[pos] += 1;
                    }
                }
                let mut best = 0usize;
                for (i, &count) in votes.iter().enumerate() {
                    if count > votes[best] {
                        best = i;
                    }
                }
                self.classes[best]
            })
            .collect();
        Array1::from_vec(predictions)
    }
}
