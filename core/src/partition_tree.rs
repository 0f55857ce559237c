//! A single random-partition (isolation) tree stored as a node arena.
//!
//! Node 0 is the root. Internal nodes reference their children by
//! index; nothing points back up the tree.

use crate::{
    error::{DetectError, DetectResult},
    matrix::FeatureMatrix,
    rng::StreamRng,
};

pub const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search over `m` points:
/// c(m) = 2(ln(m-1) + γ) - 2(m-1)/m, with c(1) = c(0) = 0.
pub fn average_path_length(m: usize) -> f64 {
    if m <= 1 {
        return 0.0;
    }
    let m1 = (m - 1) as f64;
    2.0 * (m1.ln() + EULER_GAMMA) - 2.0 * m1 / m as f64
}

/// ⌈log2(ψ)⌉, the depth at which growth stops.
pub fn max_depth_for(sub_sample_size: usize) -> usize {
    (sub_sample_size.max(1) as f64).log2().ceil() as usize
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
        depth: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTree {
    nodes: Vec<Node>,
}

impl PartitionTree {
    /// Grow a tree over the rows of `matrix` named by `sample`.
    pub fn build(
        matrix: &FeatureMatrix,
        sample: &[usize],
        max_depth: usize,
        rng: &mut StreamRng,
    ) -> DetectResult<Self> {
        if sample.is_empty() {
            return Err(DetectError::DegenerateInput { rows: 0, minimum: 1 });
        }
        if let Some(&bad) = sample.iter().find(|&&r| r >= matrix.n_rows()) {
            return Err(DetectError::DataShape { expected: matrix.n_rows(), actual: bad + 1 });
        }

        let mut rows = sample.to_vec();
        let mut tree = Self { nodes: Vec::with_capacity(2 * rows.len()) };
        tree.grow(matrix, &mut rows, 0, max_depth, rng);
        Ok(tree)
    }

    /// Returns the index of the node created for `rows`.
    fn grow(
        &mut self,
        matrix: &FeatureMatrix,
        rows: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StreamRng,
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len(), depth });

        if rows.len() <= 1 || depth >= max_depth {
            return idx;
        }

        // Features that still vary among this node's rows.
        let candidates: Vec<(usize, f64, f64)> = (0..matrix.n_cols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = matrix.value(r, f);
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();

        // Every feature constant: degenerate node stays a leaf.
        if candidates.is_empty() {
            return idx;
        }

        let (feature, lo, hi) = *rng.choose(&candidates);
        let mut threshold = rng.uniform(lo, hi);
        if threshold <= lo {
            threshold = lo + (hi - lo) / 2.0;
        }
        if threshold <= lo {
            threshold = hi;
        }

        let split = partition_in_place(rows, |r| matrix.value(r, feature) < threshold);
        let (left_rows, right_rows) = rows.split_at_mut(split);
        let left = self.grow(matrix, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(matrix, right_rows, depth + 1, max_depth, rng);

        self.nodes[idx] = Node::Split { feature, threshold, left, right };
        idx
    }

    /// Depth of the leaf `row` falls into, plus c(leaf size).
    pub fn path_length(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] < *threshold { *left } else { *right };
                }
                Node::Leaf { size, depth } => {
                    return *depth as f64 + average_path_length(*size);
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Training rows accounted for by the leaves.
    pub fn sample_size(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match n {
                Node::Leaf { size, .. } => *size,
                Node::Split { .. } => 0,
            })
            .sum()
    }

    pub fn height(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Leaf { depth, .. } => Some(*depth),
                Node::Split { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}

/// Move every element satisfying `pred` to the front; returns their count.
fn partition_in_place(rows: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut boundary = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(boundary, i);
            boundary += 1;
        }
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RngBank;

    fn matrix(rows: &[Vec<f64>]) -> FeatureMatrix {
        FeatureMatrix::from_unnamed_rows(rows).unwrap()
    }

    #[test]
    fn c_of_small_sizes() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!((average_path_length(2) - (2.0 * EULER_GAMMA - 1.0)).abs() < 1e-12);
        // c(256) ≈ 10.24
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }

    #[test]
    fn max_depth_is_ceil_log2() {
        assert_eq!(max_depth_for(256), 8);
        assert_eq!(max_depth_for(200), 8);
        assert_eq!(max_depth_for(2), 1);
    }

    #[test]
    fn leaves_cover_the_sample() {
        let rows: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64, (i * 7 % 13) as f64]).collect();
        let m = matrix(&rows);
        let sample: Vec<usize> = (0..64).collect();
        let mut rng = RngBank::new(3).for_tree(0);
        let tree = PartitionTree::build(&m, &sample, max_depth_for(64), &mut rng).unwrap();

        assert_eq!(tree.sample_size(), 64);
        assert!(tree.height() <= 6);
        assert_eq!(tree.leaf_count(), (tree.node_count() + 1) / 2);
    }

    #[test]
    fn constant_matrix_is_a_single_leaf() {
        let rows = vec![vec![1.0, 5.0]; 10];
        let m = matrix(&rows);
        let sample: Vec<usize> = (0..10).collect();
        let mut rng = RngBank::new(3).for_tree(0);
        let tree = PartitionTree::build(&m, &sample, 4, &mut rng).unwrap();

        assert_eq!(tree.nodes(), &[Node::Leaf { size: 10, depth: 0 }]);
        assert!((tree.path_length(&[1.0, 5.0]) - average_path_length(10)).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_column_never_split() {
        let rows: Vec<Vec<f64>> = (0..32).map(|i| vec![4.0, i as f64]).collect();
        let m = matrix(&rows);
        let sample: Vec<usize> = (0..32).collect();
        let mut rng = RngBank::new(9).for_tree(2);
        let tree = PartitionTree::build(&m, &sample, 5, &mut rng).unwrap();
        assert!(tree
            .nodes()
            .iter()
            .all(|n| !matches!(n, Node::Split { feature: 0, .. })));
    }

    #[test]
    fn empty_sample_is_rejected() {
        let m = matrix(&[vec![1.0]]);
        let mut rng = RngBank::new(3).for_tree(0);
        assert!(PartitionTree::build(&m, &[], 3, &mut rng).is_err());
        assert!(PartitionTree::build(&m, &[4], 3, &mut rng).is_err());
    }
}
