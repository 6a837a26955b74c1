// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::ImonError;

/// One named channel of a [`MultiChannelSeries`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct SeriesWire {
    channels: Vec<Channel>,
}

/// Validated, immutable multichannel measurement series.
///
/// All channels share the same length and are indexed by integer time step.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "SeriesWire", into = "SeriesWire")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct MultiChannelSeries {
    channels: Vec<Channel>,
    len: usize,
}

impl MultiChannelSeries {
    /// Constructs a validated series.
    pub fn new(channels: Vec<Channel>) -> Result<Self, ImonError> {
        let Some(first) = channels.first() else {
            return Err(ImonError::invalid_input("series must have at least one channel"));
        };
        let len = first.values.len();
        if len == 0 {
            return Err(ImonError::invalid_input("series length must be >= 1"));
        }

        for (idx, channel) in channels.iter().enumerate() {
            if channel.name.is_empty() {
                return Err(ImonError::invalid_input(format!(
                    "channel {idx} has an empty name"
                )));
            }
            if channels[..idx].iter().any(|prev| prev.name == channel.name) {
                return Err(ImonError::invalid_input(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
            if channel.values.len() != len {
                return Err(ImonError::invalid_input(format!(
                    "channel length mismatch: '{}' has {} samples, expected {len}",
                    channel.name,
                    channel.values.len()
                )));
            }
            if let Some((t, value)) = channel
                .values
                .iter()
                .copied()
                .enumerate()
                .find(|(_, v)| !v.is_finite())
            {
                return Err(ImonError::invalid_input(format!(
                    "non-finite value {value} in channel '{}' at t={t}",
                    channel.name
                )));
            }
        }

        Ok(Self { channels, len })
    }

    /// Convenience constructor for a single unnamed-by-caller channel.
    pub fn univariate(name: impl Into<String>, values: Vec<f64>) -> Result<Self, ImonError> {
        Self::new(vec![Channel::new(name, values)])
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a validated series holds at least one sample.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|channel| channel.name.as_str())
    }

    /// Looks up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|channel| channel.name == name)
            .map(|channel| channel.values.as_slice())
    }

    /// Resolves an optional channel name, falling back to the first channel.
    pub fn channel_or_first(&self, name: Option<&str>) -> Result<&Channel, ImonError> {
        match name {
            None => Ok(&self.channels[0]),
            Some(name) => self
                .channels
                .iter()
                .find(|channel| channel.name == name)
                .ok_or_else(|| {
                    ImonError::invalid_input(format!("unknown channel '{name}'"))
                }),
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<SeriesWire> for MultiChannelSeries {
    type Error = ImonError;

    fn try_from(wire: SeriesWire) -> Result<Self, Self::Error> {
        Self::new(wire.channels)
    }
}

#[cfg(feature = "serde")]
impl From<MultiChannelSeries> for SeriesWire {
    fn from(series: MultiChannelSeries) -> Self {
        Self {
            channels: series.channels,
        }
    }
}
