//! CART classification tree with Gini impurity.
//!
//! Nodes live in a flat arena; children are indices into `nodes`.

use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;

use super::{argmax, TrainingTable};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Index into the training table's `classes`.
        class: usize,
    },
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Features examined at each split (`mtry`).
    pub features_per_split: usize,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows `indices` of `table` (duplicates allowed, as in a bootstrap).
    pub fn fit(
        table: &TrainingTable,
        indices: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut rows = indices.to_vec();
        tree.grow(table, &mut rows, 0, params, rng);
        tree
    }

    /// Predicted class index for a feature vector.
    pub fn predict_index(&self, x: &[f64]) -> usize {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf { class } => return class,
                Node::Split { feature, threshold, left, right } => {
                    at = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }

    fn grow(
        &mut self,
        table: &TrainingTable,
        rows: &mut [usize],
        depth: usize,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let counts = class_counts(table, rows);
        let majority = argmax(&counts);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { class: majority });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
        if pure || depth_reached || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return id;
        }

        let Some((feature, threshold)) = best_split(table, rows, &counts, params, rng) else {
            return id;
        };

        let mid = partition(rows, |&r| table.value(r, feature) <= threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(table, left_rows, depth + 1, params, rng);
        let right = self.grow(table, right_rows, depth + 1, params, rng);
        self.nodes[id] = Node::Split { feature, threshold, left, right };
        id
    }
}

fn class_counts(table: &TrainingTable, rows: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; table.classes.len()];
    for &r in rows {
        counts[table.y[r]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Best (feature, threshold) by weighted Gini over `mtry` randomly chosen
/// non-constant features.
/// Returns `None` when no split lowers impurity.
fn best_split(
    table: &TrainingTable,
    rows: &[usize],
    parent_counts: &[usize],
    params: TreeParams,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let n = rows.len();
    let parent = gini(parent_counts, n);
    let mtry = params.features_per_split.clamp(1, table.n_features);
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<(usize, f64)> = None;
    let mut best_impurity = parent - 1e-12;

    // Features constant within the node do not count towards `mtry`.
    let mut examined = 0;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);
    for feature in sample_indices(rng, table.n_features, table.n_features) {
        if examined == mtry {
            break;
        }
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (table.value(r, feature), table.y[r])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        if sorted[0].0 >= sorted[n - 1].0 {
            continue;
        }
        examined += 1;

        let mut left = vec![0usize; parent_counts.len()];
        let mut right = parent_counts.to_vec();
        for i in 0..n - 1 {
            let (v, class) = sorted[i];
            left[class] += 1;
            right[class] -= 1;
            let next = sorted[i + 1].0;
            if next <= v {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let weighted =
                n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right);
            let impurity = weighted / n as f64;
            if impurity < best_impurity {
                best_impurity = impurity;
                best = Some((feature, v + (next - v) / 2.0));
            }
        }
    }
    best
}

/// In-place partition; returns the count of rows satisfying `pred`, which come first.
fn partition<F: Fn(&usize) -> bool>(rows: &mut [usize], pred: F) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(&rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
