// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use imon_core::{CancelToken, ExecutionContext};
use imon_detect::{
    EventDetector, KernelPelt, KernelPeltConfig, StaticBaseline, StaticBaselineConfig,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let config = KernelPeltConfig {
        penalty: 0.01 + f64::from(cursor.next_u8()) / 8.0,
        gamma: if cursor.next_u8() & 1 == 0 {
            None
        } else {
            Some(0.01 + f64::from(cursor.next_u8()) / 16.0)
        },
        min_segment_len: common::bounded(cursor.next_u8(), 1, 8),
        jump: common::bounded(cursor.next_u8(), 1, 8),
        cancel_check_every: common::bounded(cursor.next_u8(), 1, 32),
    };
    let Ok(detector) = KernelPelt::new(config) else {
        return;
    };

    let payload_len = common::bounded(cursor.next_u8(), 0, 160).saturating_mul(8);
    let values = common::decode_f64_chunks(&cursor.take_padded(payload_len), 160);

    let cancel = CancelToken::new();
    if cursor.next_u8() % 7 == 0 {
        cancel.cancel();
    }
    let ctx = ExecutionContext::new().with_cancel(&cancel);

    // non-finite payloads are rejected as errors
    if let Ok(result) = detector.segment(&values, &ctx) {
        let mut start = 0usize;
        for &end in &result.breakpoints {
            assert!(end > start && end <= values.len());
            start = end;
        }
    }

    let Ok(baseline) = StaticBaseline::new(StaticBaselineConfig::default()) else {
        return;
    };
    if let Ok(run) = baseline.detect(&values, &ExecutionContext::new()) {
        assert!(run.detections.iter().all(|t| t < values.len()));
    }
});
