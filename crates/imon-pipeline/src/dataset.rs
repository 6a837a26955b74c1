// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{GroundTruth, ImonError, MultiChannelSeries};
use serde::{Deserialize, Serialize};

/// A series with its labeled anomaly windows.
///
/// Every event window lies inside the series; labels are derived from the
/// events, never stored separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetWire")]
pub struct Dataset {
    series: MultiChannelSeries,
    events: GroundTruth,
}

#[derive(Deserialize)]
struct DatasetWire {
    series: MultiChannelSeries,
    #[serde(default)]
    events: GroundTruth,
}

impl TryFrom<DatasetWire> for Dataset {
    type Error = ImonError;

    fn try_from(wire: DatasetWire) -> Result<Self, Self::Error> {
        Self::new(wire.series, wire.events)
    }
}

impl Dataset {
    pub fn new(series: MultiChannelSeries, events: GroundTruth) -> Result<Self, ImonError> {
        if let Some(event) = events
            .events()
            .iter()
            .find(|event| event.end() > series.len())
        {
            return Err(ImonError::invalid_input(format!(
                "event [{}, {}) extends past series length {}",
                event.start,
                event.end(),
                series.len()
            )));
        }
        Ok(Self { series, events })
    }

    pub fn series(&self) -> &MultiChannelSeries {
        &self.series
    }

    pub fn events(&self) -> &GroundTruth {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Per-time-step labels: the union of event windows.
    pub fn labels(&self) -> Vec<bool> {
        self.events.labels(self.series.len())
    }
}
