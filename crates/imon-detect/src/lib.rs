// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod baseline;
pub mod changepoint;
pub mod isolation;
pub mod scorer;

pub use baseline::{StaticBaseline, StaticBaselineConfig};
pub use changepoint::{ChangePointResult, KernelPelt, KernelPeltConfig};
pub use isolation::{FittedIsolationEnsemble, IsolationEnsemble, IsolationEnsembleConfig};
pub use scorer::{DetectionRun, EventDetector, NoveltyScorer, ScorerFit};
