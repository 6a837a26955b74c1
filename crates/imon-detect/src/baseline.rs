// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::scorer::{DetectionRun, EventDetector, validate_values};
use imon_core::{Detections, Diagnostics, ExecutionContext, ImonError};
use std::borrow::Cow;
use tracing::debug;

const DEFAULT_SIGMA: f64 = 3.0;

/// Configuration for [`StaticBaseline`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct StaticBaselineConfig {
    pub sigma: f64,
}

impl Default for StaticBaselineConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
        }
    }
}

impl StaticBaselineConfig {
    fn validate(&self) -> Result<(), ImonError> {
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(ImonError::invalid_input(format!(
                "StaticBaselineConfig.sigma must be finite and >= 0; got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Fixed `mean + sigma * std` threshold over the whole scored series.
///
/// Unsupervised and stateless; std uses the `n - 1` denominator.
#[derive(Clone, Debug)]
pub struct StaticBaseline {
    config: StaticBaselineConfig,
}

impl StaticBaseline {
    pub fn new(config: StaticBaselineConfig) -> Result<Self, ImonError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StaticBaselineConfig {
        &self.config
    }

    /// Threshold for `values`, or `None` when fewer than two samples exist.
    pub fn threshold(&self, values: &[f64]) -> Option<f64> {
        if values.len() < 2 {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let ss = values
            .iter()
            .map(|value| {
                let centered = value - mean;
                centered * centered
            })
            .sum::<f64>();
        let std = (ss / (n - 1.0)).sqrt();
        Some(mean + self.config.sigma * std)
    }
}

impl EventDetector for StaticBaseline {
    fn detect(
        &self,
        values: &[f64],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<DetectionRun, ImonError> {
        validate_values(values, "StaticBaseline")?;

        let mut notes = vec![];
        let detections = match self.threshold(values) {
            Some(threshold) => {
                notes.push(format!("threshold={threshold}"));
                Detections::from_scores(values, threshold, 0)?
            }
            None => Detections::empty(),
        };

        debug!(
            n = values.len(),
            sigma = self.config.sigma,
            detections = detections.len(),
            "static baseline detection"
        );

        Ok(DetectionRun {
            detections,
            completed: true,
            diagnostics: Diagnostics {
                n: values.len(),
                d: 1,
                notes,
                algorithm: Cow::Borrowed("static-baseline"),
                ..Diagnostics::default()
            },
        })
    }
}
