// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{Detections, GroundTruth};
use tracing::debug;

/// Alarm-level and event-level match counts for one detection set.
///
/// `true_positives` counts every detection inside an event window, so several
/// alarms in one event all count. `detected_events` counts each event once.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub true_positives: usize,
    pub false_positives: usize,
    pub missed_events: usize,
    pub detected_events: usize,
    pub total_events: usize,
    /// Delays of true positives in detection order, then the full duration
    /// of every missed event in event order.
    pub delays: Vec<usize>,
}

impl MatchResult {
    /// Fraction of events with at least one detection; 0 with no events.
    pub fn detection_rate(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.detected_events as f64 / self.total_events as f64
        }
    }

    /// Arithmetic mean of [`MatchResult::delays`]; 0 when empty.
    pub fn mean_delay(&self) -> f64 {
        if self.delays.is_empty() {
            return 0.0;
        }
        let total = self.delays.iter().map(|&d| d as u128).sum::<u128>();
        total as f64 / self.delays.len() as f64
    }
}

/// Attributes each detection to the event window containing it.
pub fn match_events(detections: &Detections, truth: &GroundTruth) -> MatchResult {
    let events = truth.events();
    let mut matched = vec![false; events.len()];
    let mut result = MatchResult {
        total_events: events.len(),
        ..MatchResult::default()
    };

    for index in detections.iter() {
        match truth.event_containing(index) {
            Some(event_idx) => {
                result.true_positives += 1;
                result.delays.push(index - events[event_idx].start);
                matched[event_idx] = true;
            }
            None => result.false_positives += 1,
        }
    }

    for (event, &hit) in events.iter().zip(matched.iter()) {
        if hit {
            result.detected_events += 1;
        } else {
            result.missed_events += 1;
            result.delays.push(event.duration);
        }
    }

    debug!(
        detections = detections.len(),
        events = events.len(),
        true_positives = result.true_positives,
        false_positives = result.false_positives,
        missed_events = result.missed_events,
        "matched detections to events"
    );
    result
}
