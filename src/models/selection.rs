use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::boosting::{GradientBoostModel, GradientBoostParams};
use crate::models::forest::{FeatureSubset, RandomForestModel, RandomForestParams};
use crate::models::tree::SplitCriterion;
use crate::models::TrainedClassifier;

/// Hyperparameter search space and evaluation protocol for the per-cluster
/// model competition.
pub struct SearchConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub rf_grid: Vec<RandomForestParams>,
    pub xgb_grid: Vec<GradientBoostParams>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let mut rf_grid = Vec::new();
        for &n_trees in &[10, 50, 100, 130] {
            for &criterion in &[SplitCriterion::Gini, SplitCriterion::Entropy] {
                for &max_depth in &[2, 3] {
                    for &max_features in &[FeatureSubset::Sqrt, FeatureSubset::Log2] {
                        rf_grid.push(RandomForestParams {
                            n_trees,
                            criterion,
                            max_depth,
                            max_features,
                        });
                    }
                }
            }
        }
        let mut xgb_grid = Vec::new();
        for &learning_rate in &[0.5, 0.1, 0.01, 0.001] {
            for &max_depth in &[3, 5, 10, 20] {
                for &n_estimators in &[10, 50, 100, 200] {
                    xgb_grid.push(GradientBoostParams {
                        learning_rate,
                        max_depth,
                        n_estimators,
                    });
                }
            }
        }
        Self {
            test_fraction: 0.25,
            seed: 123,
            cv_folds: 5,
            rf_grid,
            xgb_grid,
        }
    }
}

/// Runs the two-family competition for one cluster: grid search each family
/// by cross-validation, refit the winners on the training split and compare
/// them on the held-out split.
pub struct ModelSelector {
    pub config: SearchConfig,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }
}

fn take_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

fn take_labels(y: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    Array1::from_vec(indices.iter().map(|&i| y[i]).collect())
}

fn accuracy(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth
        .iter()
        .zip(predicted.iter())
        .filter(|(t, p)| t == p)
        .count();
    hits as f64 / truth.len() as f64
}

/// Area under the ROC curve with the predicted label as the score and the
/// larger true label as the positive class. Ranks are averaged over ties,
/// which is exactly the Mann-Whitney formulation.
fn roc_auc(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let positive = truth.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut order: Vec<usize> = (0..predicted.len()).collect();
    order.sort_by(|&a, &b| {
        predicted[a]
            .partial_cmp(&predicted[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0.0; predicted.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && predicted[order[end + 1]] == predicted[order[start]] {
            end += 1;
        }
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            ranks[i] = mean_rank;
        }
        start = end + 1;
    }
    let n_pos = truth.iter().filter(|&&t| t == positive).count();
    let n_neg = truth.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }
    let rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|(&t, _)| t == positive)
        .map(|(_, &r)| r)
        .sum();
    (rank_sum - n_pos as f64 * (n_pos as f64 + 1.0) / 2.0) / (n_pos as f64 * n_neg as f64)
}

/// Single-class held-out labels make AUC undefined; accuracy substitutes.
fn held_out_score(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let single_class = truth.iter().all(|&t| t == truth[0]);
    if single_class {
        accuracy(truth, predicted)
    } else {
        roc_auc(truth, predicted)
    }
}

impl ModelSelector {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn select_best_model(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        cluster_id: usize,
    ) -> Result<(f64, TrainedClassifier)> {
        let n = x.nrows();
        let test_n = ((n as f64 * self.config.test_fraction).ceil() as usize).min(n.saturating_sub(1));
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = Xoshiro256Plus::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);
        let (test_idx, train_idx) = indices.split_at(test_n);
        if train_idx.len() < self.config.cv_folds {
            return Err(PipelineError::InsufficientClusterRows {
                cluster_id,
                rows: train_idx.len(),
                folds: self.config.cv_folds,
            });
        }
        let x_train = take_rows(x, train_idx);
        let y_train = take_labels(y, train_idx);
        let x_test = take_rows(x, test_idx);
        let y_test = take_labels(y, test_idx);

        let rf_params = self.search_forest(&x_train, &y_train)?;
        let rf = RandomForestModel::fit(&x_train, &y_train, rf_params, self.config.seed)?;
        let rf_score = held_out_score(&y_test, &rf.predict(&x_test));

        let xgb_params = self.search_boosting(&x_train, &y_train)?;
        let xgb = GradientBoostModel::fit(&x_train, &y_train, xgb_params)?;
        let xgb_score = held_out_score(&y_test, &xgb.predict(&x_test));

        info!(cluster_id, rf_score, xgb_score, "model competition scored");
        // Ties go to boosting.
        if rf_score > xgb_score {
            Ok((rf_score, TrainedClassifier::RandomForest(rf)))
        } else {
            Ok((xgb_score, TrainedClassifier::XGBoost(xgb)))
        }
    }

    fn search_forest(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<RandomForestParams> {
        let mut best: Option<(f64, RandomForestParams)> = None;
        for &params in &self.config.rf_grid {
            let score = self.cross_validate(x, y, |x_fit, y_fit, x_eval| {
                let model = RandomForestModel::fit(x_fit, y_fit, params, self.config.seed)?;
                Ok(model.predict(x_eval))
            })?;
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, params));
            }
        }
        let (score, params) = best.ok_or_else(|| {
            PipelineError::Tabular("random forest grid is empty".to_string())
        })?;
        debug!(?params, score, "random forest grid search finished");
        Ok(params)
    }

    fn search_boosting(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GradientBoostParams> {
        let mut best: Option<(f64, GradientBoostParams)> = None;
        for &params in &self.config.xgb_grid {
            let score = self.cross_validate(x, y, |x_fit, y_fit, x_eval| {
                let model = GradientBoostModel::fit(x_fit, y_fit, params)?;
                Ok(model.predict(x_eval))
            })?;
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, params));
            }
        }
        let (score, params) = best.ok_or_else(|| {
            PipelineError::Tabular("boosting grid is empty".to_string())
        })?;
        debug!(?params, score, "boosting grid search finished");
        Ok(params)
    }

    /// Mean accuracy over k sequential folds of the (already shuffled)
    /// training split.
    fn cross_validate<F>(&self, x: &Array2<f64>, y: &Array1<f64>, fit_predict: F) -> Result<f64>
    where
        F: Fn(&Array2<f64>, &Array1<f64>, &Array2<f64>) -> Result<Array1<f64>>,
    {
        let n = x.nrows();
        let folds = self.config.cv_folds;
        let mut total = 0.0;
        for fold in 0..folds {
            let lo = n * fold / folds;
            let hi = n * (fold + 1) / folds;
            let eval_idx: Vec<usize> = (lo..hi).collect();
            let fit_idx: Vec<usize> = (0..n).filter(|i| *i < lo || *i >= hi).collect();
            if eval_idx.is_empty() || fit_idx.is_empty() {
                continue;
            }
            let predicted = fit_predict(
                &take_rows(x, &fit_idx),
                &take_labels(y, &fit_idx),
                &take_rows(x, &eval_idx),
            )?;
            total += accuracy(&take_labels(y, &eval_idx), &predicted);
        }
        Ok(total / folds as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelFamily;
    use ndarray::{array, Array2};

    /// Cheap grids keep the tests fast while exercising the same protocol.
    fn small_selector() -> ModelSelector {
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

    fn separable(n_per_class: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            rows.push(vec![i as f64 * 0.1, 0.0]);
            labels.push(-1.0);
            rows.push(vec![10.0 + i as f64 * 0.1, 1.0]);
            labels.push(1.0);
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        (
            Array2::from_shape_vec((rows.len(), 2), flat).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn selects_a_model_on_separable_data() {
        let (x, y) = separable(12);
        let (score, model) = small_selector().select_best_model(&x, &y, 0).unwrap();
        assert!(score > 0.9);
        let predictions = model.predict(&array![[0.5, 0.0], [10.5, 1.0]]);
        assert_eq!(predictions, array![-1.0, 1.0]);
    }

    #[test]
    fn too_few_rows_for_the_folds_is_an_error() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![-1.0, 1.0, -1.0, 1.0];
        let err = small_selector().select_best_model(&x, &y, 2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientClusterRows { cluster_id: 2, .. }
        ));
    }

    #[test]
    fn equal_scores_prefer_boosting() {
        // Both families score perfectly on cleanly separable data, so the
        // tie rule decides.
        let (x, y) = separable(12);
        let (_, model) = small_selector().select_best_model(&x, &y, 0).unwrap();
        assert_eq!(model.family(), ModelFamily::XGBoost);
    }

    #[test]
    fn auc_handles_ties_and_perfect_separation() {
        let truth = array![-1.0, -1.0, 1.0, 1.0];
        assert_eq!(roc_auc(&truth, &array![-1.0, -1.0, 1.0, 1.0]), 1.0);
        // All predictions identical carries no ranking information.
        assert_eq!(roc_auc(&truth, &array![1.0, 1.0, 1.0, 1.0]), 0.5);
    }

    #[test]
    fn single_class_held_out_scores_by_accuracy() {
        let truth = array![1.0, 1.0];
        assert_eq!(held_out_score(&truth, &array![1.0, 1.0]), 1.0);
        assert_eq!(held_out_score(&truth, &array![1.0, -1.0]), 0.5);
    }
}
