//! Random-partition forest: an isolation-style anomaly engine.
//!
//! Fit:   T trees, each grown on its own sub-sample of ψ rows drawn
//!        without replacement, on a bounded rayon worker pool.
//! Score: s(x) = 2^(-E[h(x)] / c(ψ)). Higher = more anomalous.
//! Decide: score >= threshold, where the threshold is the
//!        ⌈contamination · n⌉-th highest training score.
//!
//! RULES:
//!   - Each tree draws only from RngBank::for_tree(i), so the fitted
//!     ensemble is identical for any worker count.
//!   - A failed tree build fails the whole fit; no partial ensembles.
//!   - After fit the trees are read-only; only the threshold may move
//!     (set_contamination).

use crate::{
    config::{validate_contamination, ForestConfig, MAX_SUB_SAMPLE_SIZE},
    error::{DetectError, DetectResult},
    matrix::FeatureMatrix,
    partition_tree::{average_path_length, max_depth_for, PartitionTree},
    rng::{RngBank, StreamRng},
    types::Label,
};
use rayon::prelude::*;

pub const MIN_FIT_ROWS: usize = 2;

/// Guards `ceil` against products like 0.07 * 100 = 7.000000000000001.
const RANK_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct RandomPartitionForest {
    trees: Vec<PartitionTree>,
    n_features: usize,
    sub_sample_size: usize,
    /// c(ψ), the path-length normaliser.
    normalizer: f64,
    contamination: f64,
    threshold: f64,
    /// Training scores, highest first.
    training_scores: Vec<f64>,
}

impl RandomPartitionForest {
    pub fn fit(matrix: &FeatureMatrix, config: &ForestConfig) -> DetectResult<Self> {
        config.validate()?;
        let n = matrix.n_rows();
        if n < MIN_FIT_ROWS {
            return Err(DetectError::DegenerateInput { rows: n, minimum: MIN_FIT_ROWS });
        }

        let sub_sample_size = match config.sub_sample_size {
            Some(psi) if psi > n => {
                log::warn!("forest: sub_sample_size {psi} exceeds {n} rows, using {n}");
                n
            }
            Some(psi) => psi,
            None => MAX_SUB_SAMPLE_SIZE.min(n),
        };
        let max_depth = max_depth_for(sub_sample_size);
        let bank = RngBank::new(config.seed);

        let build_all = || -> DetectResult<Vec<PartitionTree>> {
            (0..config.num_trees)
                .into_par_iter()
                .map(|i| {
                    let mut rng = bank.for_tree(i);
                    let sample = sub_sample(n, sub_sample_size, &mut rng);
                    PartitionTree::build(matrix, &sample, max_depth, &mut rng)
                })
                .collect()
        };

        let trees = match config.worker_threads {
            Some(requested) => {
                let cores = std::thread::available_parallelism().map(|c| c.get()).unwrap_or(1);
                let workers = requested.min(cores);
                let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
                log::debug!("forest: building on {workers} workers");
                pool.install(build_all)?
            }
            None => build_all()?,
        };

        log::info!(
            "forest: fitted {} trees (ψ={sub_sample_size}, max_depth={max_depth}) on {n}×{} matrix",
            trees.len(),
            matrix.n_cols()
        );

        let mut forest = Self {
            trees,
            n_features: matrix.n_cols(),
            sub_sample_size,
            normalizer: average_path_length(sub_sample_size),
            contamination: config.contamination,
            threshold: f64::INFINITY,
            training_scores: Vec::new(),
        };

        let mut scores = forest.score_matrix(matrix)?;
        scores.sort_by(|a, b| b.total_cmp(a));
        forest.training_scores = scores;
        forest.threshold = forest.threshold_for(forest.contamination);
        log::debug!(
            "forest: threshold {:.6} at contamination {}",
            forest.threshold,
            forest.contamination
        );
        Ok(forest)
    }

    /// A single row gets the same checks `FeatureMatrix` applies on construction.
    fn check_row(&self, row: &[f64]) -> DetectResult<()> {
        if row.len() != self.n_features {
            return Err(DetectError::DataShape { expected: self.n_features, actual: row.len() });
        }
        if let Some(column) = row.iter().position(|v| !v.is_finite()) {
            return Err(DetectError::NonFiniteFeature { row: 0, column });
        }
        Ok(())
    }

    /// Mean adjusted path length over the ensemble.
    pub fn mean_path_length(&self, row: &[f64]) -> DetectResult<f64> {
        self.check_row(row)?;
        let total: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Anomaly score in (0, 1]; near 1 = isolated quickly.
    pub fn score(&self, row: &[f64]) -> DetectResult<f64> {
        let h = self.mean_path_length(row)?;
        Ok(2f64.powf(-h / self.normalizer))
    }

    pub fn score_matrix(&self, matrix: &FeatureMatrix) -> DetectResult<Vec<f64>> {
        if matrix.n_cols() != self.n_features {
            return Err(DetectError::DataShape {
                expected: self.n_features,
                actual: matrix.n_cols(),
            });
        }
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|i| self.score(matrix.row(i)))
            .collect()
    }

    pub fn predict(&self, row: &[f64]) -> DetectResult<Label> {
        Ok(u8::from(self.score(row)? >= self.threshold))
    }

    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> DetectResult<Vec<Label>> {
        Ok(self
            .score_matrix(matrix)?
            .into_iter()
            .map(|s| u8::from(s >= self.threshold))
            .collect())
    }

    /// Move the decision threshold without refitting the trees.
    pub fn set_contamination(&mut self, contamination: f64) -> DetectResult<()> {
        validate_contamination(contamination)?;
        self.contamination = contamination;
        self.threshold = self.threshold_for(contamination);
        log::debug!("forest: threshold moved to {:.6}", self.threshold);
        Ok(())
    }

    /// The k-th highest training score, k = ⌈c·n⌉ clamped to [1, n].
    fn threshold_for(&self, contamination: f64) -> f64 {
        let n = self.training_scores.len();
        let k = ((contamination * n as f64) - RANK_EPSILON).ceil() as usize;
        self.training_scores[k.clamp(1, n) - 1]
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn trees(&self) -> &[PartitionTree] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn sub_sample_size(&self) -> usize {
        self.sub_sample_size
    }

    /// Training scores, highest first.
    pub fn training_scores(&self) -> &[f64] {
        &self.training_scores
    }
}

/// `size` distinct row indices out of `n` (partial Fisher-Yates).
fn sub_sample(n: usize, size: usize, rng: &mut StreamRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..size.min(n) {
        let j = i + rng.below(n - i);
        indices.swap(i, j);
    }
    indices.truncate(size);
    indices
}
