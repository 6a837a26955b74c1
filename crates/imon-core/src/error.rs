// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Error type shared by every stage of the monitoring pipeline.
///
/// All variants describe deterministic local faults: repeating the failing
/// call on identical input yields the same error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ImonError {
    #[error("invalid window: window={window} must satisfy 1 <= window <= series length {len}")]
    InvalidWindow { window: usize, len: usize },
    #[error("empty training set: no normal-labeled rows available to fit the scorer")]
    EmptyTrainingSet,
    #[error("invalid quantile: {0} is outside the open interval (0, 1)")]
    InvalidQuantile(f64),
    #[error(
        "overlapping events: [{first_start}, {first_end}) overlaps [{second_start}, {second_end})"
    )]
    OverlappingEvents {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ImonError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}
