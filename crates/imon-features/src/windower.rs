// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::FeatureMatrix;
use imon_core::{ImonError, MultiChannelSeries};
use tracing::debug;

/// Number of rolling features produced for every channel.
pub const FEATURES_PER_CHANNEL: usize = 6;

/// Column suffixes in emission order; column names are `{channel}_{suffix}`.
pub const FEATURE_SUFFIXES: [&str; FEATURES_PER_CHANNEL] =
    ["mean", "std", "min", "max", "last", "diff"];

const DEFAULT_WINDOW: usize = 30;

/// Trailing-window feature extractor.
///
/// For each index `i` with a full window `[i - W + 1, i]` and a defined first
/// difference, emits mean, population std, min, max, the raw value at `i`,
/// and `x[i] - x[i - 1]` for every channel. The first row therefore sits at
/// `max(W - 1, 1)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureWindower {
    window: usize,
}

impl Default for FeatureWindower {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl FeatureWindower {
    /// Window length is validated against the series at transform time.
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Index of the first emitted row on the original time axis.
    pub fn first_index(&self) -> usize {
        self.window.saturating_sub(1).max(1)
    }

    /// Row count for a series of length `len`, or an error for an invalid window.
    pub fn output_rows(&self, len: usize) -> Result<usize, ImonError> {
        if self.window == 0 || self.window > len {
            return Err(ImonError::InvalidWindow {
                window: self.window,
                len,
            });
        }
        Ok(len.saturating_sub(self.first_index()))
    }

    /// Column names for the given channel names, in emission order.
    pub fn column_names<'a>(&self, channels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        channels
            .into_iter()
            .flat_map(|channel| {
                FEATURE_SUFFIXES
                    .iter()
                    .map(move |suffix| format!("{channel}_{suffix}"))
            })
            .collect()
    }

    pub fn transform(&self, series: &MultiChannelSeries) -> Result<FeatureMatrix, ImonError> {
        let len = series.len();
        let n_rows = self.output_rows(len)?;
        let first = self.first_index();
        let n_cols = series
            .n_channels()
            .checked_mul(FEATURES_PER_CHANNEL)
            .ok_or_else(|| ImonError::resource_limit("feature column count overflow"))?;
        let total = n_rows
            .checked_mul(n_cols)
            .ok_or_else(|| ImonError::resource_limit("feature matrix size overflow"))?;

        let mut data = vec![0.0; total];
        for (channel_idx, channel) in series.channels().iter().enumerate() {
            let values = &channel.values;
            for row in 0..n_rows {
                let t = first + row;
                let window = &values[t + 1 - self.window..=t];
                let offset = row * n_cols + channel_idx * FEATURES_PER_CHANNEL;
                write_window_features(
                    &mut data[offset..offset + FEATURES_PER_CHANNEL],
                    window,
                    values[t - 1],
                );
            }
        }

        debug!(
            window = self.window,
            len,
            channels = series.n_channels(),
            rows = n_rows,
            cols = n_cols,
            "windowed feature matrix"
        );

        FeatureMatrix::new(
            data,
            self.column_names(series.names()),
            (first..len).collect(),
        )
    }
}

fn write_window_features(out: &mut [f64], window: &[f64], previous: f64) {
    let w = window.len() as f64;
    let mean = window.iter().sum::<f64>() / w;
    let var = window
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / w;
    let min = window.iter().copied().fold(f64::INFINITY, f64::min);
    let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let last = window[window.len() - 1];

    out[0] = mean;
    out[1] = var.max(0.0).sqrt();
    out[2] = min;
    out[3] = max;
    out[4] = last;
    out[5] = last - previous;
}
