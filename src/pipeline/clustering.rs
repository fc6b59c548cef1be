use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::{KMeans, KMeansInit};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};

pub const CLUSTERING_SEED: u64 = 123;
const MAX_CLUSTER_CANDIDATES: usize = 10;
const MAX_ITERATIONS: u64 = 300;
const KNEE_SENSITIVITY: f64 = 1.0;

/// Fitted k-means partition: the centroids plus the parameters that produced
/// them. Persisting the centroids directly keeps the artifact a plain JSON
/// document, and nearest-centroid assignment at prediction time replays
/// training exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansPartitioner {
    pub k: usize,
    pub seed: u64,
    centroids: Vec<Vec<f64>>,
}

impl KMeansPartitioner {
    /// Fits k-means with k-means++ seeding on a fixed seed, so the same data
    /// always yields the same partition.
    pub fn fit(x: &Array2<f64>, k: usize, seed: u64) -> Result<Self> {
        let dataset = DatasetBase::from(x.clone());
        let rng = Xoshiro256Plus::seed_from_u64(seed);
        let model = KMeans::params_with_rng(k, rng)
            .init_method(KMeansInit::KMeansPlusPlus)
            .max_n_iterations(MAX_ITERATIONS)
            .fit(&dataset)
            .map_err(|e| PipelineError::Clustering(format!("k-means fit failed for k={}: {}", k, e)))?;
        let centroids = model
            .centroids()
            .outer_iter()
            .map(|row| row.to_vec())
            .collect();
        Ok(Self { k, seed, centroids })
    }

    fn width(&self) -> usize {
        self.centroids.first().map(Vec::len).unwrap_or(0)
    }

    fn nearest(&self, row: &[f64]) -> usize {
        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let distance: f64 = row
                .iter()
                .zip(centroid)
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
            if distance < best_distance {
                best_distance = distance;
                best = i;
            }
        }
        best
    }

    /// Assigns each row to its nearest centroid. Rejects matrices whose width
    /// differs from the one the model was fitted on.
    pub fn assign(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let expected = self.width();
        if x.ncols() != expected {
            return Err(PipelineError::Clustering(format!(
                "feature width {} does not match the fitted model ({})",
                x.ncols(),
                expected
            )));
        }
        Ok(Array1::from_vec(
            x.outer_iter().map(|row| self.nearest(&row.to_vec())).collect(),
        ))
    }

    /// Within-cluster sum of squares over `x`, the elbow-curve statistic.
    pub fn wcss(&self, x: &Array2<f64>) -> Result<f64> {
        let assignments = self.assign(x)?;
        let mut total = 0.0;
        for (row, &cluster) in x.outer_iter().zip(assignments.iter()) {
            total += row
                .iter()
                .zip(&self.centroids[cluster])
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum::<f64>();
        }
        Ok(total)
    }
}

/// Discovers the cluster count by fitting k = 1..=10, computing the WCSS
/// curve and locating its knee.
pub struct ClusterCountSelector {
    pub seed: u64,
}

impl Default for ClusterCountSelector {
    fn default() -> Self {
        Self { seed: CLUSTERING_SEED }
    }
}

impl ClusterCountSelector {
    /// Returns the selected k and the WCSS curve that justified it. A curve
    /// with no knee means the data gives no usable cluster structure, which
    /// is fatal rather than silently defaulting.
    pub fn select(&self, x: &Array2<f64>) -> Result<(usize, Vec<f64>)> {
        let max_k = MAX_CLUSTER_CANDIDATES.min(x.nrows().max(1));
        let mut wcss = Vec::with_capacity(max_k);
        for k in 1..=max_k {
            let model = KMeansPartitioner::fit(x, k, self.seed)?;
            wcss.push(model.wcss(x)?);
        }
        let k = find_knee(&wcss).ok_or_else(|| {
            PipelineError::NoKnee(format!(
                "wcss curve over k=1..={} has no knee, cluster count is undecidable",
                max_k
            ))
        })?;
        info!(k, "cluster count selected from wcss curve");
        Ok((k, wcss))
    }
}

/// Knee of a decreasing convex curve: normalize both axes to [0, 1], flip the
/// y axis and take the interior argmax of the difference curve, provided it
/// clears the sensitivity threshold. A straight line has no knee.
pub fn find_knee(wcss: &[f64]) -> Option<usize> {
    let n = wcss.len();
    if n < 3 {
        return None;
    }
    let (min_y, max_y) = wcss
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max_y - min_y <= f64::EPSILON {
        return None;
    }
    let threshold = KNEE_SENSITIVITY / (n as f64 - 1.0);
    let mut best: Option<(usize, f64)> = None;
    for (i, &y) in wcss.iter().enumerate() {
        let x_norm = i as f64 / (n as f64 - 1.0);
        let y_norm = (y - min_y) / (max_y - min_y);
        let diff = (1.0 - y_norm) - x_norm;
        // Endpoints cannot be knees.
        if i == 0 || i == n - 1 {
            continue;
        }
        if diff > threshold && best.map(|(_, d)| diff > d).unwrap_or(true) {
            best = Some((i, diff));
        }
    }
    best.map(|(i, _)| i + 1)
}

/// Renders the WCSS elbow curve as a standalone SVG line chart, the
/// diagnostic artifact written next to the persisted models.
pub fn elbow_plot_svg(wcss: &[f64]) -> String {
    const WIDTH: f64 = 640.0;
    const HEIGHT: f64 = 400.0;
    const MARGIN: f64 = 48.0;
    let n = wcss.len();
    let (min_y, max_y) = wcss
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if max_y - min_y <= f64::EPSILON { 1.0 } else { max_y - min_y };
    let point = |i: usize, y: f64| {
        let px = MARGIN + (WIDTH - 2.0 * MARGIN) * i as f64 / (n.max(2) as f64 - 1.0);
        let py = HEIGHT - MARGIN - (HEIGHT - 2.0 * MARGIN) * (y - min_y) / span;
        (px, py)
    };
    let polyline: Vec<String> = wcss
        .iter()
        .enumerate()
        .map(|(i, &y)| {
            let (px, py) = point(i, y);
            format!("{:.1},{:.1}", px, py)
        })
        .collect();
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{0}\" height=\"{1}\" viewBox=\"0 0 {0} {1}\">\n",
        WIDTH, HEIGHT
    ));
    svg.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    svg.push_str(&format!(
        "  <line x1=\"{m}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"black\"/>\n",
        m = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN
    ));
    svg.push_str(&format!(
        "  <line x1=\"{m}\" y1=\"{m}\" x2=\"{m}\" y2=\"{b}\" stroke=\"black\"/>\n",
        m = MARGIN,
        b = HEIGHT - MARGIN
    ));
    svg.push_str(&format!(
        "  <polyline fill=\"none\" stroke=\"steelblue\" stroke-width=\"2\" points=\"{}\"/>\n",
        polyline.join(" ")
    ));
    for (i, &y) in wcss.iter().enumerate() {
        let (px, py) = point(i, y);
        svg.push_str(&format!(
            "  <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"steelblue\"/>\n",
            px, py
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"middle\">{}</text>\n",
            px,
            HEIGHT - MARGIN + 16.0,
            i + 1
        ));
    }
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"13\" text-anchor=\"middle\">number of clusters</text>\n",
        WIDTH / 2.0,
        HEIGHT - 12.0
    ));
    svg.push_str(&format!(
        "  <text x=\"16\" y=\"{:.1}\" font-size=\"13\" text-anchor=\"middle\" transform=\"rotate(-90 16 {:.1})\">within-cluster sum of squares</text>\n",
        HEIGHT / 2.0,
        HEIGHT / 2.0
    ));
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Three well-separated blobs of four points each.
    fn blobs() -> Array2<f64> {
        let mut rows = Vec::new();
        for &(cx, cy) in &[(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)] {
            for &(dx, dy) in &[(0.0, 0.0), (0.5, 0.0), (0.0, 0.5), (0.5, 0.5)] {
                rows.push(vec![cx + dx, cy + dy]);
            }
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), 2), flat).unwrap()
    }

    #[test]
    fn same_seed_gives_same_assignments() {
        let x = blobs();
        let a = KMeansPartitioner::fit(&x, 3, CLUSTERING_SEED).unwrap();
        let b = KMeansPartitioner::fit(&x, 3, CLUSTERING_SEED).unwrap();
        assert_eq!(a.assign(&x).unwrap(), b.assign(&x).unwrap());
    }

    #[test]
    fn assignment_rejects_mismatched_width() {
        let x = blobs();
        let model = KMeansPartitioner::fit(&x, 3, CLUSTERING_SEED).unwrap();
        let narrow = Array2::zeros((2, 1));
        assert!(matches!(
            model.assign(&narrow).unwrap_err(),
            PipelineError::Clustering(_)
        ));
    }

    #[test]
    fn wcss_decreases_with_more_clusters() {
        let x = blobs();
        let one = KMeansPartitioner::fit(&x, 1, CLUSTERING_SEED).unwrap().wcss(&x).unwrap();
        let three = KMeansPartitioner::fit(&x, 3, CLUSTERING_SEED).unwrap().wcss(&x).unwrap();
        assert!(three < one);
    }

    #[test]
    fn selector_finds_three_blobs() {
        let x = blobs();
        let (k, wcss) = ClusterCountSelector::default().select(&x).unwrap();
        assert_eq!(k, 3);
        assert_eq!(wcss.len(), 10);
    }

    #[test]
    fn knee_of_sharp_elbow_curve() {
        // Steep drop to index 2 (k=3) then flat.
        let wcss = [100.0, 40.0, 8.0, 6.0, 5.0, 4.5, 4.0, 3.8, 3.6, 3.5];
        assert_eq!(find_knee(&wcss), Some(3));
    }

    #[test]
    fn straight_line_has_no_knee() {
        let wcss = [100.0, 90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0];
        assert_eq!(find_knee(&wcss), None);
    }

    #[test]
    fn partitioner_round_trips_through_json() {
        let x = blobs();
        let model = KMeansPartitioner::fit(&x, 3, CLUSTERING_SEED).unwrap();
        let bytes = serde_json::to_vec(&model).unwrap();
        let restored: KMeansPartitioner = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.k, 3);
        assert_eq!(model.assign(&x).unwrap(), restored.assign(&x).unwrap());
    }

    #[test]
    fn elbow_plot_is_well_formed_svg() {
        let svg = elbow_plot_svg(&[100.0, 40.0, 8.0, 6.0, 5.0]);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("polyline"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
