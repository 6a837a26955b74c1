// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{Detections, ImonError};
use tracing::debug;

pub const DEFAULT_ALARM_QUANTILE: f64 = 0.995;

/// Linear-interpolation quantile between order statistics.
///
/// With sorted `x` of length `n`, `h = (n - 1) * q` and the result is
/// `x[floor(h)] + (h - floor(h)) * (x[floor(h) + 1] - x[floor(h)])`.
pub fn quantile(scores: &[f64], q: f64) -> Result<f64, ImonError> {
    if !(q > 0.0 && q < 1.0) {
        return Err(ImonError::InvalidQuantile(q));
    }
    if scores.is_empty() {
        return Err(ImonError::EmptyTrainingSet);
    }
    if let Some(pos) = scores.iter().position(|score| !score.is_finite()) {
        return Err(ImonError::invalid_input(format!(
            "calibration scores must be finite; scores[{pos}]={}",
            scores[pos]
        )));
    }

    let mut sorted = scores.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    Ok(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Scalar decision boundary; a score is anomalous when strictly above it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threshold {
    pub value: f64,
    pub quantile: f64,
}

impl Threshold {
    pub fn is_anomalous(&self, score: f64) -> bool {
        score > self.value
    }

    /// Row positions above the threshold, shifted by `offset`.
    pub fn detections(&self, scores: &[f64], offset: usize) -> Result<Detections, ImonError> {
        Detections::from_scores(scores, self.value, offset)
    }
}

/// Derives a [`Threshold`] from in-sample normal scores.
#[derive(Clone, Copy, Debug)]
pub struct ThresholdCalibrator {
    quantile: f64,
}

impl Default for ThresholdCalibrator {
    fn default() -> Self {
        Self {
            quantile: DEFAULT_ALARM_QUANTILE,
        }
    }
}

impl ThresholdCalibrator {
    pub fn new(quantile: f64) -> Result<Self, ImonError> {
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(ImonError::InvalidQuantile(quantile));
        }
        Ok(Self { quantile })
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn calibrate(&self, normal_scores: &[f64]) -> Result<Threshold, ImonError> {
        let value = quantile(normal_scores, self.quantile)?;
        debug!(
            quantile = self.quantile,
            n = normal_scores.len(),
            threshold = value,
            "calibrated threshold"
        );
        Ok(Threshold {
            value,
            quantile: self.quantile,
        })
    }
}
