pub mod boosting;
pub mod forest;
pub mod registry;
pub mod selection;
pub mod tree;

use ndarray::{Array1, Array2};

use crate::domain::ModelFamily;
use boosting::GradientBoostModel;
use forest::RandomForestModel;

/// A fitted per-cluster classifier of either family, ready to persist or
/// score with.
#[derive(Debug)]
pub enum TrainedClassifier {
    RandomForest(RandomForestModel),
    XGBoost(GradientBoostModel),
}

impl TrainedClassifier {
    pub fn family(&self) -> ModelFamily {
        match self {
            TrainedClassifier::RandomForest(_) => ModelFamily::RandomForest,
            TrainedClassifier::XGBoost(_) => ModelFamily::XGBoost,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        match self {
            TrainedClassifier::RandomForest(model) => model.predict(x),
            TrainedClassifier::XGBoost(model) => model.predict(x),
        }
    }
}
