// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod matcher;
pub mod metrics;
pub mod threshold;

pub use matcher::{MatchResult, match_events};
pub use metrics::{
    MetricsRecord, aggregate, auprc, auroc, false_alarm_reduction_percent, false_alarms_per_hour,
};
pub use threshold::{DEFAULT_ALARM_QUANTILE, Threshold, ThresholdCalibrator, quantile};
