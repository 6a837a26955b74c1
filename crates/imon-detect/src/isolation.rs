// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::scorer::{NoveltyScorer, ScorerFit};
use imon_core::ImonError;
use imon_features::FeatureMatrix;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

const DEFAULT_N_ESTIMATORS: usize = 100;
const DEFAULT_MAX_SAMPLES: usize = 256;
const DEFAULT_CONTAMINATION: f64 = 0.01;
const DEFAULT_SEED: u64 = 42;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Configuration for [`IsolationEnsemble`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct IsolationEnsembleConfig {
    pub n_estimators: usize,
    /// Per-tree subsample size, capped at the training row count.
    pub max_samples: usize,
    /// Expected outlier fraction. Recorded with the model; scores and
    /// calibrated thresholds do not depend on it.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationEnsembleConfig {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
        }
    }
}

impl IsolationEnsembleConfig {
    fn validate(&self) -> Result<(), ImonError> {
        if self.n_estimators == 0 {
            return Err(ImonError::invalid_input(
                "IsolationEnsembleConfig.n_estimators must be >= 1; got 0",
            ));
        }
        if self.max_samples == 0 {
            return Err(ImonError::invalid_input(
                "IsolationEnsembleConfig.max_samples must be >= 1; got 0",
            ));
        }
        if !self.contamination.is_finite()
            || self.contamination <= 0.0
            || self.contamination > 0.5
        {
            return Err(ImonError::invalid_input(format!(
                "IsolationEnsembleConfig.contamination must be in (0, 0.5]; got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

/// Unfitted isolation-forest ensemble.
#[derive(Clone, Debug)]
pub struct IsolationEnsemble {
    config: IsolationEnsembleConfig,
}

impl IsolationEnsemble {
    pub fn new(config: IsolationEnsembleConfig) -> Result<Self, ImonError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IsolationEnsembleConfig {
        &self.config
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as a node arena rooted at index 0.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
struct IsolationTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    rows: &'a FeatureMatrix,
    depth_limit: usize,
    rng: ChaCha8Rng,
    features: Vec<usize>,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, sample: &mut [usize], depth: usize) -> usize {
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: sample.len() });
        if depth >= self.depth_limit || sample.len() <= 1 {
            return node_id;
        }

        let Some((feature, low, high)) = self.pick_split_feature(sample) else {
            return node_id;
        };
        // convex combination stays finite when `high - low` overflows
        let u: f64 = self.rng.gen();
        let threshold = low * (1.0 - u) + high * u;

        let mut split = 0usize;
        for idx in 0..sample.len() {
            if self.rows.row(sample[idx])[feature] <= threshold {
                sample.swap(idx, split);
                split += 1;
            }
        }

        let (left_sample, right_sample) = sample.split_at_mut(split);
        let left = self.grow(left_sample, depth + 1);
        let right = self.grow(right_sample, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_id
    }

    /// Random feature with a non-degenerate range over `sample`.
    fn pick_split_feature(&mut self, sample: &[usize]) -> Option<(usize, f64, f64)> {
        self.features.shuffle(&mut self.rng);
        for &feature in &self.features {
            let (low, high) = sample.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(low, high), &row| {
                    let value = self.rows.row(row)[feature];
                    (low.min(value), high.max(value))
                },
            );
            if low < high {
                return Some((feature, low, high));
            }
        }
        None
    }
}

impl IsolationTree {
    fn fit(rows: &FeatureMatrix, sample_size: usize, depth_limit: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sample = rand::seq::index::sample(&mut rng, rows.n_rows(), sample_size).into_vec();
        let mut builder = TreeBuilder {
            rows,
            depth_limit,
            rng,
            features: (0..rows.n_cols()).collect(),
            nodes: Vec::new(),
        };
        builder.grow(&mut sample, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0usize;
        let mut depth = 0usize;
        loop {
            match &self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1;
                }
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
            }
        }
    }
}

/// Expected path length of an unsuccessful binary-search-tree lookup over
/// `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted ensemble. Immutable; scoring is a pure function of the rows.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FittedIsolationEnsemble {
    config: IsolationEnsembleConfig,
    n_features: usize,
    sample_size: usize,
    trees: Vec<IsolationTree>,
}

impl FittedIsolationEnsemble {
    pub fn config(&self) -> &IsolationEnsembleConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Rows drawn per tree: `min(max_samples, training rows)`.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Anomaly score in `(0, 1]`: `2^(-E[h(x)] / c(sample_size))`.
    pub fn score_row(&self, row: &[f64]) -> Result<f64, ImonError> {
        if row.len() != self.n_features {
            return Err(ImonError::invalid_input(format!(
                "feature width mismatch: model expects {}, got {}",
                self.n_features,
                row.len()
            )));
        }
        if let Some(col) = row.iter().position(|value| !value.is_finite()) {
            return Err(ImonError::invalid_input(format!(
                "feature row contains non-finite value at col {col}"
            )));
        }
        Ok(self.score_checked(row))
    }

    fn score_checked(&self, row: &[f64]) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if normalizer == 0.0 {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.path_length(row)).sum();
        let mean = total / self.trees.len() as f64;
        2f64.powf(-mean / normalizer)
    }
}

impl NoveltyScorer for FittedIsolationEnsemble {
    fn score(&self, rows: &FeatureMatrix) -> Result<Vec<f64>, ImonError> {
        if rows.n_cols() != self.n_features {
            return Err(ImonError::invalid_input(format!(
                "feature width mismatch: model expects {}, got {}",
                self.n_features,
                rows.n_cols()
            )));
        }

        #[cfg(feature = "rayon")]
        let scores = rows
            .as_slice()
            .par_chunks_exact(self.n_features)
            .map(|row| self.score_checked(row))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let scores = rows.rows().map(|row| self.score_checked(row)).collect();

        Ok(scores)
    }
}

impl ScorerFit for IsolationEnsemble {
    type Fitted = FittedIsolationEnsemble;

    fn fit(&self, normal_rows: &FeatureMatrix) -> Result<FittedIsolationEnsemble, ImonError> {
        if normal_rows.is_empty() {
            return Err(ImonError::EmptyTrainingSet);
        }

        let sample_size = self.config.max_samples.min(normal_rows.n_rows());
        let depth_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        let mut master = ChaCha8Rng::seed_from_u64(self.config.seed);
        let tree_seeds: Vec<u64> = (0..self.config.n_estimators)
            .map(|_| master.gen())
            .collect();

        #[cfg(feature = "rayon")]
        let trees = tree_seeds
            .par_iter()
            .map(|&seed| IsolationTree::fit(normal_rows, sample_size, depth_limit, seed))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let trees = tree_seeds
            .iter()
            .map(|&seed| IsolationTree::fit(normal_rows, sample_size, depth_limit, seed))
            .collect();

        let fitted = FittedIsolationEnsemble {
            config: self.config.clone(),
            n_features: normal_rows.n_cols(),
            sample_size,
            trees,
        };

        debug!(
            sample_size,
            depth_limit,
            nodes = fitted.trees.iter().map(|tree| tree.nodes.len()).sum::<usize>(),
            "grew isolation trees"
        );
        info!(
            n_estimators = self.config.n_estimators,
            rows = normal_rows.n_rows(),
            cols = normal_rows.n_cols(),
            seed = self.config.seed,
            "fitted isolation ensemble"
        );
        Ok(fitted)
    }
}
