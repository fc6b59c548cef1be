use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared shape of an incoming batch, loaded once per pipeline run.
///
/// Field names follow the schema document convention (§ external interfaces):
/// a JSON object with three integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "LengthOfDateStampInFile")]
    pub date_stamp_length: usize,
    #[serde(rename = "LengthOfTimeStampInFile")]
    pub time_stamp_length: usize,
    #[serde(rename = "NumberOfColumns")]
    pub column_count: usize,
}

/// Logical partition a batch file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Unvalidated,
    Good,
    Bad,
}

/// One file of an enumerated batch and where validation routed it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub partition: Partition,
}

/// The two classifier families searched per cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    RandomForest,
    XGBoost,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::RandomForest => write!(f, "RandomForest"),
            ModelFamily::XGBoost => write!(f, "XGBoost"),
        }
    }
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::RandomForest, ModelFamily::XGBoost];
}

/// Composite identity of a persisted model artifact.
///
/// The clustering model is stored under the reserved `KMeans` name with no
/// cluster suffix; per-cluster classifiers are keyed by `family ++ cluster_id`
/// (e.g. `RandomForest2`). Parsing and rendering live here so the registry
/// can query by cluster component instead of slicing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKey {
    Clusterer,
    Classifier { family: ModelFamily, cluster_id: usize },
}

pub const CLUSTERER_NAME: &str = "KMeans";

impl ModelKey {
    pub fn classifier(family: ModelFamily, cluster_id: usize) -> Self {
        ModelKey::Classifier { family, cluster_id }
    }

    /// Name used in storage paths, `KMeans` or `family ++ cluster_id`.
    pub fn name(&self) -> String {
        match self {
            ModelKey::Clusterer => CLUSTERER_NAME.to_string(),
            ModelKey::Classifier { family, cluster_id } => format!("{}{}", family, cluster_id),
        }
    }

    /// Inverse of [`ModelKey::name`]. Returns `None` for names that are
    /// neither the reserved clusterer name nor a known family with a
    /// trailing cluster id.
    pub fn parse(name: &str) -> Option<ModelKey> {
        if name == CLUSTERER_NAME {
            return Some(ModelKey::Clusterer);
        }
        let digits_at = name.find(|c: char| c.is_ascii_digit())?;
        let (prefix, digits) = name.split_at(digits_at);
        let cluster_id: usize = digits.parse().ok()?;
        let family = match prefix {
            "RandomForest" => ModelFamily::RandomForest,
            "XGBoost" => ModelFamily::XGBoost,
            _ => return None,
        };
        Some(ModelKey::Classifier { family, cluster_id })
    }

    /// The cluster component of the key, absent for the reserved clusterer.
    pub fn cluster_id(&self) -> Option<usize> {
        match self {
            ModelKey::Clusterer => None,
            ModelKey::Classifier { cluster_id, .. } => Some(*cluster_id),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Explicit found/missing result for collaborator lookups.
///
/// Distinguishes clean absence from failure: absence is a value, failure is
/// an `Err`. Call sites decide whether `Missing` is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Missing,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }
}

/// One scored row of prediction output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "Wafer")]
    pub wafer_id: i64,
    #[serde(rename = "Output")]
    pub output: i64,
}
