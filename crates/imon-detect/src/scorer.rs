// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{Detections, Diagnostics, ExecutionContext, ImonError};
use imon_features::FeatureMatrix;

/// A fitted model that maps feature rows to anomaly scores.
///
/// Higher scores are more anomalous. Implementations never mutate model
/// state while scoring, so one fitted scorer can serve concurrent readers.
pub trait NoveltyScorer {
    fn score(&self, rows: &FeatureMatrix) -> Result<Vec<f64>, ImonError>;
}

/// Fit phase for a [`NoveltyScorer`] trained on normal rows only.
pub trait ScorerFit {
    type Fitted: NoveltyScorer;

    fn fit(&self, normal_rows: &FeatureMatrix) -> Result<Self::Fitted, ImonError>;
}

/// Output of a detector that flags time indices directly, without scores.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRun {
    pub detections: Detections,
    /// False when the run stopped early on cancellation.
    pub completed: bool,
    pub diagnostics: Diagnostics,
}

/// Detector contract over one raw channel: values in, detections out.
pub trait EventDetector {
    fn detect(&self, values: &[f64], ctx: &ExecutionContext<'_>)
        -> Result<DetectionRun, ImonError>;
}

pub(crate) fn validate_values(values: &[f64], detector: &str) -> Result<(), ImonError> {
    if let Some((t, value)) = values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(ImonError::invalid_input(format!(
            "{detector} requires finite values; got {value} at t={t}"
        )));
    }
    Ok(())
}
