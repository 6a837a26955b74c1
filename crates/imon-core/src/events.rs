// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::ImonError;

/// Labeled anomaly window `[start, start + duration)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnomalyEvent {
    pub start: usize,
    pub duration: usize,
}

impl AnomalyEvent {
    pub fn new(start: usize, duration: usize) -> Self {
        Self { start, duration }
    }

    /// Exclusive end of the window, saturating at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.duration)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }
}

/// Validated ground truth for one series: pairwise
/// non-overlapping windows sorted by start.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<AnomalyEvent>", into = "Vec<AnomalyEvent>")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroundTruth {
    events: Vec<AnomalyEvent>,
}

impl GroundTruth {
    /// Validates and sorts events.
    ///
    /// Fails with [`ImonError::OverlappingEvents`] if any two windows share an
    /// index, and with `InvalidInput` for zero-length windows.
    pub fn new(mut events: Vec<AnomalyEvent>) -> Result<Self, ImonError> {
        if let Some(event) = events.iter().find(|event| event.duration == 0) {
            return Err(ImonError::invalid_input(format!(
                "event starting at {} has duration 0; duration must be >= 1",
                event.start
            )));
        }
        if let Some(event) = events
            .iter()
            .find(|event| event.start.checked_add(event.duration).is_none())
        {
            return Err(ImonError::resource_limit(format!(
                "event end overflows usize: start={}, duration={}",
                event.start, event.duration
            )));
        }

        events.sort_unstable();
        for pair in events.windows(2) {
            if pair[1].start < pair[0].end() {
                return Err(ImonError::OverlappingEvents {
                    first_start: pair[0].start,
                    first_end: pair[0].end(),
                    second_start: pair[1].start,
                    second_end: pair[1].end(),
                });
            }
        }

        Ok(Self { events })
    }

    pub fn events(&self) -> &[AnomalyEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the position of the event whose window contains `index`.
    pub fn event_containing(&self, index: usize) -> Option<usize> {
        let candidate = self
            .events
            .partition_point(|event| event.start <= index)
            .checked_sub(1)?;
        self.events[candidate]
            .contains(index)
            .then_some(candidate)
    }

    /// Binary labels of length `len`: true exactly on the union of windows.
    pub fn labels(&self, len: usize) -> Vec<bool> {
        let mut labels = vec![false; len];
        for event in &self.events {
            let start = event.start.min(len);
            let end = event.end().min(len);
            labels[start..end].iter_mut().for_each(|label| *label = true);
        }
        labels
    }

    /// Restricts windows to `[start, end)`, dropping events with no overlap.
    pub fn clipped(&self, start: usize, end: usize) -> Self {
        let events = self
            .events
            .iter()
            .filter_map(|event| {
                let clipped_start = event.start.max(start);
                let clipped_end = event.end().min(end);
                (clipped_end > clipped_start)
                    .then(|| AnomalyEvent::new(clipped_start, clipped_end - clipped_start))
            })
            .collect();
        Self { events }
    }
}

impl TryFrom<Vec<AnomalyEvent>> for GroundTruth {
    type Error = ImonError;

    fn try_from(events: Vec<AnomalyEvent>) -> Result<Self, Self::Error> {
        Self::new(events)
    }
}

impl From<GroundTruth> for Vec<AnomalyEvent> {
    fn from(truth: GroundTruth) -> Self {
        truth.events
    }
}
