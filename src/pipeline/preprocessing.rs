use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::error::{PipelineError, Result};

const IMPUTE_NEIGHBORS: usize = 3;

/// Named feature matrix handed between the preprocessing steps.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub x: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, x: Array2<f64>) -> Self {
        Self { names, x }
    }
}

pub fn has_missing(x: &Array2<f64>) -> bool {
    x.iter().any(|v| v.is_nan())
}

/// Distance between two rows that ignores coordinates missing on either side,
/// rescaled by the fraction observed so sparse rows are not artificially
/// close.
fn masked_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    let mut present = 0usize;
    let mut sum_sq = 0.0;
    for (&u, &v) in a.iter().zip(b) {
        if u.is_nan() || v.is_nan() {
            continue;
        }
        present += 1;
        sum_sq += (u - v) * (u - v);
    }
    if present == 0 {
        return None;
    }
    Some((a.len() as f64 / present as f64 * sum_sq).sqrt())
}

/// Fills each missing cell with the mean of that column over the k nearest
/// rows that observe it. Falls back to the column mean when no usable
/// neighbor exists, and to zero when the whole column is missing.
pub fn impute_missing_knn(x: &Array2<f64>) -> Result<Array2<f64>> {
    let (n_rows, n_cols) = x.dim();
    if n_rows == 0 {
        return Err(PipelineError::Tabular("cannot impute an empty matrix".to_string()));
    }
    let column_means: Vec<f64> = (0..n_cols)
        .map(|c| {
            let column = x.index_axis(Axis(1), c);
            let (sum, count) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        })
        .collect();
    let rows: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
    let mut filled = x.clone();
    for (r, row) in rows.iter().enumerate() {
        if !row.iter().any(|v| v.is_nan()) {
            continue;
        }
        // Neighbors sorted once per incomplete row, reused for each gap.
        let mut neighbors: Vec<(f64, usize)> = rows
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != r)
            .filter_map(|(other, candidate)| {
                masked_distance(row, candidate).map(|d| (d, other))
            })
            .collect();
        neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        for (c, &value) in row.iter().enumerate() {
            if !value.is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut taken = 0usize;
            for &(_, other) in &neighbors {
                let candidate = rows[other][c];
                if candidate.is_nan() {
                    continue;
                }
                sum += candidate;
                taken += 1;
                if taken == IMPUTE_NEIGHBORS {
                    break;
                }
            }
            filled[[r, c]] = if taken > 0 {
                sum / taken as f64
            } else {
                column_means[c]
            };
        }
    }
    Ok(filled)
}

/// Indexes of columns with zero standard deviation. Constant sensors carry no
/// signal and break distance-based models.
pub fn zero_std_columns(x: &Array2<f64>) -> Vec<usize> {
    let (n_rows, n_cols) = x.dim();
    if n_rows == 0 {
        return Vec::new();
    }
    (0..n_cols)
        .filter(|&c| {
            let column = x.index_axis(Axis(1), c);
            let mean = column.sum() / n_rows as f64;
            let variance = column.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n_rows as f64;
            variance == 0.0
        })
        .collect()
}

/// Removes the named columns by index, keeping names and data aligned.
pub fn drop_columns(matrix: FeatureMatrix, drop: &[usize]) -> FeatureMatrix {
    if drop.is_empty() {
        return matrix;
    }
    let keep: Vec<usize> = (0..matrix.x.ncols()).filter(|c| !drop.contains(c)).collect();
    let names: Vec<String> = keep.iter().map(|&c| matrix.names[c].clone()).collect();
    let mut x = Array2::zeros((matrix.x.nrows(), keep.len()));
    for (new_c, &old_c) in keep.iter().enumerate() {
        x.column_mut(new_c).assign(&matrix.x.index_axis(Axis(1), old_c));
    }
    info!(dropped = drop.len(), remaining = keep.len(), "zero variance columns removed");
    FeatureMatrix::new(names, x)
}

/// Full preprocessing pass: impute gaps, then drop constant columns.
pub fn prepare_features(matrix: FeatureMatrix) -> Result<FeatureMatrix> {
    let x = if has_missing(&matrix.x) {
        info!("missing values present, running imputation");
        impute_missing_knn(&matrix.x)?
    } else {
        matrix.x
    };
    let matrix = FeatureMatrix::new(matrix.names, x);
    let constant = zero_std_columns(&matrix.x);
    Ok(drop_columns(matrix, &constant))
}

/// Parses the `Good/Bad` label column into an integer target vector.
pub fn parse_labels(values: &[&str]) -> Result<Array1<f64>> {
    values
        .iter()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| PipelineError::Tabular(format!("label is not numeric: {}", v)))
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}
