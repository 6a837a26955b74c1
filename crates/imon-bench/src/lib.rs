// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Deterministic fixtures shared by the criterion benches.

use imon_core::{Channel, ImonError, MultiChannelSeries};

/// Noisy daily cycle with a level shift over the second half.
pub fn step_cycle(n: usize, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|t| {
            let x = t as f64;
            let level = if t >= n / 2 { 3.0 } else { 0.0 };
            let cycle = (2.0 * std::f64::consts::PI * x / 1440.0 + phase).sin();
            level + cycle + 0.1 * (x * 0.37).cos()
        })
        .collect()
}

/// `channels` phase-shifted copies of [`step_cycle`].
pub fn multichannel(n: usize, channels: usize) -> Result<MultiChannelSeries, ImonError> {
    MultiChannelSeries::new(
        (0..channels)
            .map(|c| Channel::new(format!("ch{c}"), step_cycle(n, c as f64 * 0.5)))
            .collect(),
    )
}
