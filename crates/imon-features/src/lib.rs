// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod matrix;
pub mod windower;

pub use matrix::FeatureMatrix;
pub use windower::{FEATURE_SUFFIXES, FEATURES_PER_CHANNEL, FeatureWindower};
