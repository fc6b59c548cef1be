use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::tree::{grow_regression_tree, Node};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostParams {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub n_estimators: usize,
}

/// Gradient-boosted trees for binary classification under logistic loss.
///
/// Boosting is inherently binary here: the two labels sort ascending into
/// `classes`, the second one plays the positive role, and each round fits a
/// regression tree to the Newton statistics of the current margin.
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostModel {
    pub params: GradientBoostParams,
    classes: Vec<f64>,
    base_score: f64,
    trees: Vec<Node>,
    /// Set when training saw a single label; prediction then short-circuits
    /// to that constant.
    constant_class: Option<f64>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoostModel {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: GradientBoostParams) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || y.len() != n {
            return Err(PipelineError::Tabular(format!(
                "cannot boost on {} rows with {} labels",
                n,
                y.len()
            )));
        }
        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        classes.dedup();
        if classes.len() == 1 {
            return Ok(Self {
                params,
                constant_class: Some(classes[0]),
                classes,
                base_score: 0.0,
                trees: Vec::new(),
            });
        }
        if classes.len() > 2 {
            return Err(PipelineError::Tabular(format!(
                "boosting expects a binary target, found {} classes",
                classes.len()
            )));
        }
        let positive = classes[1];
        let y01: Vec<f64> = y.iter().map(|&v| if v == positive { 1.0 } else { 0.0 }).collect();
        let prior = (y01.iter().sum::<f64>() / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();
        let indices: Vec<usize> = (0..n).collect();
        let mut margins = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(n);
            let mut hess = Vec::with_capacity(n);
            for (i, &target) in y01.iter().enumerate() {
                let p = sigmoid(margins[i]);
                grad.push(target - p);
                hess.push(p * (1.0 - p));
            }
            let tree = grow_regression_tree(x, &grad, &hess, &indices, params.max_depth);
            for (i, row) in x.outer_iter().enumerate() {
                margins[i] += params.learning_rate * tree.evaluate(&row.to_vec());
            }
            trees.push(tree);
        }
        Ok(Self {
            params,
            classes,
            base_score,
            trees,
            constant_class: None,
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        if let Some(constant) = self.constant_class {
            return Array1::from_elem(x.nrows(), constant);
        }
        let predictions: Vec<f64> = x
            .outer_iter()
            .map(|row| {
                let row: Vec<f64> = row.to_vec();
                let margin = self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.params.learning_rate * tree.evaluate(&row))
                        .sum::<f64>();
                if sigmoid(margin) > 0.5 {
                    self.classes[1]
                } else {
                    self.classes[0]
                }
            })
            .collect();
        Array1::from_vec(predictions)
    }
}
