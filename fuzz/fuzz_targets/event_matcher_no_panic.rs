// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use imon_core::{AnomalyEvent, Detections, GroundTruth};
use imon_eval::{aggregate, match_events, quantile};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let n_events = common::bounded(cursor.next_u8(), 0, 16);
    let events: Vec<AnomalyEvent> = (0..n_events)
        .map(|_| {
            let start = usize::from(cursor.next_u16() % 2_048);
            let duration = usize::from(cursor.next_u8());
            AnomalyEvent::new(start, duration)
        })
        .collect();

    // overlapping or zero-length windows must be rejected, never panic
    let Ok(truth) = GroundTruth::new(events) else {
        return;
    };

    let n_detections = common::bounded(cursor.next_u8(), 0, 128);
    let detections = Detections::from_unsorted(
        (0..n_detections)
            .map(|_| usize::from(cursor.next_u16() % 2_304))
            .collect(),
    );

    let result = match_events(&detections, &truth);
    assert_eq!(
        result.true_positives + result.false_positives,
        detections.len()
    );
    assert_eq!(result.detected_events + result.missed_events, truth.len());

    let len = 2_304usize;
    let labels = truth.labels(len);
    let scores: Vec<f64> = (0..len)
        .map(|i| f64::from(cursor.next_i16()) / 64.0 + i as f64 * 1e-6)
        .collect();
    let q = f64::from(cursor.next_u8()) / 255.0;
    let _ = quantile(&scores, q);

    if let Ok(record) = aggregate(Some(&scores), &labels, 0.0, &result) {
        if let Some(auroc) = record.auroc {
            assert!((0.0..=1.0).contains(&auroc));
        }
        assert!(record.false_alarms_per_hour.is_finite());
    }
});
