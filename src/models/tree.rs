use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Impurity measure for classification splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

impl SplitCriterion {
    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        match self {
            SplitCriterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / total as f64;
                        p * p
                    })
                    .sum::<f64>()
            }
            SplitCriterion::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / total as f64;
                    -p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Binary decision tree over numeric features. Leaves hold either a class
/// vote or a regression value, depending on how the tree was grown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn evaluate(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { value } => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.evaluate(row)
                } else {
                    right.evaluate(row)
                }
            }
        }
    }
}

const MIN_GAIN: f64 = 1e-12;

fn class_counts(classes: &[f64], y: &Array1<f64>, indices: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; classes.len()];
    for &i in indices {
        if let Some(pos) = classes.iter().position(|&c| c == y[i]) {
            counts[pos] += 1;
        }
    }
    counts
}

/// Majority class of the index set; ties resolve to the smaller label so the
/// result does not depend on iteration order.
fn majority_class(classes: &[f64], counts: &[usize]) -> f64 {
    let mut best = 0usize;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[best] || (count == counts[best] && classes[i] < classes[best]) {
            best = i;
        }
    }
    classes[best]
}

/// Best threshold on one feature by impurity decrease: sort the index set by
/// the feature and scan the boundaries between distinct values.
fn best_classification_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    classes: &[f64],
    indices: &[usize],
    feature: usize,
    criterion: SplitCriterion,
    parent_impurity: f64,
) -> Option<(f64, f64)> {
    let mut sorted: Vec<usize> = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total = sorted.len();
    let mut left_counts = vec![0usize; classes.len()];
    let mut right_counts = class_counts(classes, y, &sorted);
    let mut best: Option<(f64, f64)> = None;
    for split_at in 1..total {
        let moved = sorted[split_at - 1];
        if let Some(pos) = classes.iter().position(|&c| c == y[moved]) {
            left_counts[pos] += 1;
            right_counts[pos] -= 1;
        }
        let prev = x[[sorted[split_at - 1], feature]];
        let next = x[[sorted[split_at], feature]];
        if prev == next {
            continue;
        }
        let left_impurity = criterion.impurity(&left_counts, split_at);
        let right_impurity = criterion.impurity(&right_counts, total - split_at);
        let weighted = (split_at as f64 * left_impurity
            + (total - split_at) as f64 * right_impurity)
            / total as f64;
        let gain = parent_impurity - weighted;
        if gain > best.map(|(g, _)| g).unwrap_or(MIN_GAIN) {
            best = Some((gain, (prev + next) / 2.0));
        }
    }
    best.map(|(gain, threshold)| (threshold, gain))
}

/// Grows a classification tree on the index set, sampling a fresh feature
/// subset at every node as random forests do.
pub fn grow_classification_tree<R: Rng>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    classes: &[f64],
    indices: &[usize],
    criterion: SplitCriterion,
    max_depth: usize,
    features_per_split: usize,
    rng: &mut R,
) -> Node {
    let counts = class_counts(classes, y, indices);
    let parent_impurity = criterion.impurity(&counts, indices.len());
    let leaf = Node::Leaf {
        value: majority_class(classes, &counts),
    };
    if max_depth == 0 || indices.len() < 2 || parent_impurity == 0.0 {
        return leaf;
    }
    let mut candidates: Vec<usize> = (0..x.ncols()).collect();
    candidates.shuffle(rng);
    candidates.truncate(features_per_split.max(1));
    let mut best: Option<(f64, usize, f64)> = None;
    for &feature in &candidates {
        if let Some((threshold, gain)) =
            best_classification_split(x, y, classes, indices, feature, criterion, parent_impurity)
        {
            if gain > best.map(|(g, _, _)| g).unwrap_or(MIN_GAIN) {
                best = Some((gain, feature, threshold));
            }
        }
    }
    let (_, feature, threshold) = match best {
        Some(found) => found,
        None => return leaf,
    };
    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[[i, feature]] <= threshold);
    if left_idx.is_empty() || right_idx.is_empty() {
        return leaf;
    }
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_classification_tree(
            x,
            y,
            classes,
            &left_idx,
            criterion,
            max_depth - 1,
            features_per_split,
            rng,
        )),
        right: Box::new(grow_classification_tree(
            x,
            y,
            classes,
            &right_idx,
            criterion,
            max_depth - 1,
            features_per_split,
            rng,
        )),
    }
}

/// Newton leaf value for logistic-loss boosting.
fn newton_leaf(grad: &[f64], hess: &[f64], indices: &[usize], lambda: f64) -> f64 {
    let g: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h: f64 = indices.iter().map(|&i| hess[i]).sum();
    g / (h + lambda)
}

fn structure_score(grad: &[f64], hess: &[f64], indices: &[usize], lambda: f64) -> f64 {
    let g: f64 = indices.iter().map(|&i| grad[i]).sum();
    let h: f64 = indices.iter().map(|&i| hess[i]).sum();
    g * g / (h + lambda)
}

const BOOST_LAMBDA: f64 = 1.0;

/// Grows one regression tree on gradient and hessian statistics, maximizing
/// the structure-score gain at each node. All features are candidates; depth
/// is the only stopping knob the grid exposes.
pub fn grow_regression_tree(
    x: &Array2<f64>,
    grad: &[f64],
    hess: &[f64],
    indices: &[usize],
    max_depth: usize,
) -> Node {
    let leaf = Node::Leaf {
        value: newton_leaf(grad, hess, indices, BOOST_LAMBDA),
    };
    if max_depth == 0 || indices.len() < 2 {
        return leaf;
    }
    let parent_score = structure_score(grad, hess, indices, BOOST_LAMBDA);
    let mut best: Option<(f64, usize, f64)> = None;
    for feature in 0..x.ncols() {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for split_at in 1..sorted.len() {
            let prev = x[[sorted[split_at - 1], feature]];
            let next = x[[sorted[split_at], feature]];
            if prev == next {
                continue;
            }
            let (left, right) = sorted.split_at(split_at);
            let gain = structure_score(grad, hess, left, BOOST_LAMBDA)
                + structure_score(grad, hess, right, BOOST_LAMBDA)
                - parent_score;
            if gain > best.map(|(g, _, _)| g).unwrap_or(0.0) {
                best = Some((gain, feature, (prev + next) / 2.0));
            }
        }
    }
    let (_, feature, threshold) = match best {
        Some(found) => found,
        None => return leaf,
    };
    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[[i, feature]] <= threshold);
    if left_idx.is_empty() || right_idx.is_empty() {
        return leaf;
    }
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_regression_tree(x, grad, hess, &left_idx, max_depth - 1)),
        right: Box::new(grow_regression_tree(x, grad, hess, &right_idx, max_depth - 1)),
    }
}
