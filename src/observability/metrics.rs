//! Metrics catalog for the wafer pipeline.
//!
//! Every metric name used anywhere in the system lives in one enum, so there
//! are no magic strings and renames happen in a single place.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Validation metrics
    ValidationFilesAccepted,
    ValidationFilesRejected,

    // Insertion metrics
    InsertionRowsInserted,

    // Training metrics
    TrainingRunsSuccess,
    TrainingRunsError,
    TrainingModelsTrained,

    // Prediction metrics
    PredictionRunsSuccess,
    PredictionRunsError,
    PredictionRowsScored,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ValidationFilesAccepted => "wafer_validation_files_accepted_total",
            MetricName::ValidationFilesRejected => "wafer_validation_files_rejected_total",
            MetricName::InsertionRowsInserted => "wafer_insertion_rows_inserted_total",
            MetricName::TrainingRunsSuccess => "wafer_training_runs_success_total",
            MetricName::TrainingRunsError => "wafer_training_runs_error_total",
            MetricName::TrainingModelsTrained => "wafer_training_models_trained_total",
            MetricName::PredictionRunsSuccess => "wafer_prediction_runs_success_total",
            MetricName::PredictionRunsError => "wafer_prediction_runs_error_total",
            MetricName::PredictionRowsScored => "wafer_prediction_rows_scored_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub mod validation {
    use super::MetricName;

    pub fn files_accepted(count: u64) {
        ::metrics::counter!(MetricName::ValidationFilesAccepted.as_str()).increment(count);
    }

    pub fn files_rejected(count: u64) {
        ::metrics::counter!(MetricName::ValidationFilesRejected.as_str()).increment(count);
    }
}

pub mod insertion {
    use super::MetricName;

    pub fn rows_inserted(count: u64) {
        ::metrics::counter!(MetricName::InsertionRowsInserted.as_str()).increment(count);
    }
}

pub mod training {
    use super::MetricName;

    pub fn run_success() {
        ::metrics::counter!(MetricName::TrainingRunsSuccess.as_str()).increment(1);
    }

    pub fn run_error() {
        ::metrics::counter!(MetricName::TrainingRunsError.as_str()).increment(1);
    }

    pub fn models_trained(count: u64) {
        ::metrics::counter!(MetricName::TrainingModelsTrained.as_str()).increment(count);
    }
}

pub mod prediction {
    use super::MetricName;

    pub fn run_success() {
        ::metrics::counter!(MetricName::PredictionRunsSuccess.as_str()).increment(1);
    }

    pub fn run_error() {
        ::metrics::counter!(MetricName::PredictionRunsError.as_str()).increment(1);
    }

    pub fn rows_scored(count: u64) {
        ::metrics::counter!(MetricName::PredictionRowsScored.as_str()).increment(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_the_crate_prefix_convention() {
        let names = [
            MetricName::ValidationFilesAccepted,
            MetricName::ValidationFilesRejected,
            MetricName::InsertionRowsInserted,
            MetricName::TrainingRunsSuccess,
            MetricName::TrainingRunsError,
            MetricName::TrainingModelsTrained,
            MetricName::PredictionRunsSuccess,
            MetricName::PredictionRunsError,
            MetricName::PredictionRowsScored,
        ];
        for name in names {
            assert!(name.as_str().starts_with("wafer_"));
            assert!(name.as_str().ends_with("_total"));
        }
    }
}
