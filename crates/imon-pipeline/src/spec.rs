// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::ImonError;
use imon_detect::{IsolationEnsembleConfig, KernelPeltConfig, StaticBaselineConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_WINDOW_SIZE: usize = 30;
const DEFAULT_TEST_SPLIT_RATIO: f64 = 0.3;
const DEFAULT_SEED: u64 = 42;

/// One pipeline run: windowing, split, calibration, and the detection strategy.
///
/// Deserialized from JSON; omitted fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSpec {
    pub window_size: usize,
    /// Trailing fraction of feature rows held out for evaluation, in `(0, 1]`.
    pub test_split_ratio: f64,
    pub alarm_quantile: f64,
    pub seed: u64,
    pub detector: DetectorConfig,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            test_split_ratio: DEFAULT_TEST_SPLIT_RATIO,
            alarm_quantile: imon_eval::DEFAULT_ALARM_QUANTILE,
            seed: DEFAULT_SEED,
            detector: DetectorConfig::default(),
        }
    }
}

impl PipelineSpec {
    pub fn validate(&self) -> Result<(), ImonError> {
        if self.window_size == 0 {
            return Err(ImonError::invalid_input(
                "PipelineSpec.window_size must be >= 1; got 0",
            ));
        }
        if !self.test_split_ratio.is_finite()
            || self.test_split_ratio <= 0.0
            || self.test_split_ratio > 1.0
        {
            return Err(ImonError::invalid_input(format!(
                "PipelineSpec.test_split_ratio must be in (0, 1]; got {}",
                self.test_split_ratio
            )));
        }
        if !(self.alarm_quantile > 0.0 && self.alarm_quantile < 1.0) {
            return Err(ImonError::InvalidQuantile(self.alarm_quantile));
        }
        self.detector.validate(self.seed)
    }

    /// Same spec with a different detection strategy.
    pub fn with_detector(&self, detector: DetectorConfig) -> Self {
        Self {
            detector,
            ..self.clone()
        }
    }
}

/// Detection strategy, tagged by `"kind"` in JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    Ensemble(EnsembleSpec),
    StaticBaseline(StaticBaselineSpec),
    ChangePoint(ChangePointSpec),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::Ensemble(EnsembleSpec::default())
    }
}

impl DetectorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ensemble(_) => "ensemble",
            Self::StaticBaseline(_) => "static_baseline",
            Self::ChangePoint(_) => "change_point",
        }
    }

    fn validate(&self, seed: u64) -> Result<(), ImonError> {
        match self {
            Self::Ensemble(spec) => {
                imon_detect::IsolationEnsemble::new(spec.to_config(seed))?;
            }
            Self::StaticBaseline(spec) => {
                imon_detect::StaticBaseline::new(spec.to_config())?;
            }
            Self::ChangePoint(spec) => {
                imon_detect::KernelPelt::new(spec.to_config())?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSpec {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
}

impl Default for EnsembleSpec {
    fn default() -> Self {
        let defaults = IsolationEnsembleConfig::default();
        Self {
            n_estimators: defaults.n_estimators,
            max_samples: defaults.max_samples,
            contamination: defaults.contamination,
        }
    }
}

impl EnsembleSpec {
    /// The ensemble draws its trees from the pipeline seed.
    pub fn to_config(&self, seed: u64) -> IsolationEnsembleConfig {
        IsolationEnsembleConfig {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            contamination: self.contamination,
            seed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticBaselineSpec {
    /// Channel to threshold; the first channel when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub sigma: f64,
}

impl Default for StaticBaselineSpec {
    fn default() -> Self {
        Self {
            channel: None,
            sigma: StaticBaselineConfig::default().sigma,
        }
    }
}

impl StaticBaselineSpec {
    pub fn to_config(&self) -> StaticBaselineConfig {
        StaticBaselineConfig { sigma: self.sigma }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangePointSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    pub min_segment_len: usize,
    pub jump: usize,
    pub cancel_check_every: usize,
}

impl Default for ChangePointSpec {
    fn default() -> Self {
        let defaults = KernelPeltConfig::default();
        Self {
            channel: None,
            penalty: defaults.penalty,
            gamma: defaults.gamma,
            min_segment_len: defaults.min_segment_len,
            jump: defaults.jump,
            cancel_check_every: defaults.cancel_check_every,
        }
    }
}

impl ChangePointSpec {
    pub fn to_config(&self) -> KernelPeltConfig {
        KernelPeltConfig {
            penalty: self.penalty,
            gamma: self.gamma,
            min_segment_len: self.min_segment_len,
            jump: self.jump,
            cancel_check_every: self.cancel_check_every,
        }
    }
}
