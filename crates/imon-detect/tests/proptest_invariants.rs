// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::ExecutionContext;
use imon_detect::{
    EventDetector, IsolationEnsemble, IsolationEnsembleConfig, KernelPelt, KernelPeltConfig,
    NoveltyScorer, ScorerFit, StaticBaseline, StaticBaselineConfig,
};
use imon_features::FeatureMatrix;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

const MIN_PROPTEST_CASES: u32 = 64;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn make_matrix(values: &[f64], d: usize) -> FeatureMatrix {
    let n = values.len() / d;
    FeatureMatrix::new(
        values[..n * d].to_vec(),
        (0..d).map(|j| format!("f{j}")).collect(),
        (0..n).collect(),
    )
    .expect("generated matrix should be valid")
}

fn assert_breakpoint_invariants(
    breakpoints: &[usize],
    n: usize,
    min_segment_len: usize,
    jump: usize,
) {
    assert_eq!(breakpoints.last().copied(), Some(n));
    let mut start = 0usize;
    for &end in breakpoints {
        assert!(end > start, "breakpoints must be strictly increasing");
        assert!(
            end - start >= min_segment_len,
            "segment [{start}, {end}) violates min_segment_len={min_segment_len}"
        );
        start = end;
    }
    for &bp in &breakpoints[..breakpoints.len() - 1] {
        assert_eq!(bp % jump, 0, "change point {bp} must respect jump={jump}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        .. ProptestConfig::default()
    })]

    #[test]
    fn ensemble_scores_are_deterministic_and_bounded(
        values in prop::collection::vec(-10.0f64..10.0, 8..240),
        d in 1usize..4,
        seed in any::<u64>(),
    ) {
        prop_assume!(values.len() >= d);
        let train = make_matrix(&values, d);
        let config = IsolationEnsembleConfig {
            n_estimators: 16,
            seed,
            ..IsolationEnsembleConfig::default()
        };
        let model = IsolationEnsemble::new(config.clone())
            .expect("config should be valid")
            .fit(&train)
            .expect("fit should succeed");
        let refit = IsolationEnsemble::new(config)
            .expect("config should be valid")
            .fit(&train)
            .expect("fit should succeed");

        let first = model.score(&train).expect("score should succeed");
        let second = model.score(&train).expect("score should succeed");
        let third = refit.score(&train).expect("score should succeed");
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &third);
        prop_assert!(first.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn kernel_pelt_breakpoints_respect_constraints(
        values in prop::collection::vec(-20.0f64..20.0, 16..96),
        min_segment_len in 1usize..6,
        jump in 1usize..6,
        penalty in 0.5f64..20.0,
    ) {
        let n = values.len();
        prop_assume!(min_segment_len * 2 <= n);
        let detector = KernelPelt::new(KernelPeltConfig {
            penalty,
            min_segment_len,
            jump,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let result = detector
            .segment(&values, &ExecutionContext::new())
            .expect("segmentation should succeed");
        prop_assert!(result.completed);
        assert_breakpoint_invariants(&result.breakpoints, n, min_segment_len, jump);
        prop_assert_eq!(result.change_points.len(), result.breakpoints.len() - 1);
    }

    #[test]
    fn constant_series_never_yields_change_points(
        value in -50.0f64..50.0,
        n in 4usize..160,
        penalty in 0.1f64..50.0,
    ) {
        let detector = KernelPelt::new(KernelPeltConfig {
            penalty,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let run = detector
            .detect(&vec![value; n], &ExecutionContext::new())
            .expect("detection should succeed");
        prop_assert!(run.detections.is_empty());
    }

    #[test]
    fn static_baseline_detections_exceed_threshold(
        values in prop::collection::vec(-100.0f64..100.0, 2..300),
        sigma in 0.0f64..4.0,
    ) {
        let baseline = StaticBaseline::new(StaticBaselineConfig { sigma })
            .expect("config should be valid");
        let threshold = baseline.threshold(&values).expect("two or more samples");
        let run = baseline
            .detect(&values, &ExecutionContext::new())
            .expect("detection should succeed");
        for (t, value) in values.iter().enumerate() {
            let flagged = run.detections.as_slice().binary_search(&t).is_ok();
            prop_assert_eq!(flagged, *value > threshold);
        }
    }
}
