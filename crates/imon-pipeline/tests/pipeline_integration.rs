// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{
    CancelToken, Channel, ExecutionContext, GroundTruth, MultiChannelSeries, TelemetrySink,
};
use imon_eval::false_alarm_reduction_percent;
use imon_features::FeatureWindower;
use imon_pipeline::{
    ChangePointSpec, CompressorSimulation, Dataset, DetectorConfig, FlareSimulation, ModelHandle,
    PipelineSpec, StaticBaselineSpec, run_comparison, run_pipeline, simulate_compressor,
    simulate_flare,
};
use std::sync::Mutex;

#[derive(Default)]
struct RecordingTelemetry {
    keys: Mutex<Vec<String>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn record_scalar(&self, key: &'static str, _value: f64) {
        self.keys
            .lock()
            .expect("telemetry lock should not be poisoned")
            .push(key.to_string());
    }
}

#[test]
fn compressor_features_have_expected_shape() {
    let dataset = simulate_compressor(&CompressorSimulation::default()).expect("simulate");
    let matrix = FeatureWindower::new(30)
        .transform(dataset.series())
        .expect("windowing should succeed");
    assert_eq!(matrix.n_rows(), 1410);
    assert_eq!(matrix.n_cols(), 36);
    assert_eq!(matrix.first_index(), Some(29));
}

#[test]
fn ensemble_pipeline_on_compressor_data_is_deterministic() {
    let dataset = simulate_compressor(&CompressorSimulation::default()).expect("simulate");
    let spec = PipelineSpec::default();

    let first = run_pipeline(&dataset, &spec, &ExecutionContext::new()).expect("pipeline");
    let second = run_pipeline(&dataset, &spec, &ExecutionContext::new()).expect("pipeline");

    assert_eq!(first.detector, "ensemble");
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.detections, second.detections);
    // (1 - 0.3) * 1410 rounds just below 987, so 986 rows train
    assert_eq!(first.test_rows, 424);
    assert_eq!(first.test_start, 29 + 986);

    let matches = &first.matches;
    assert_eq!(
        matches.true_positives + matches.false_positives,
        first.detections.len()
    );
    assert_eq!(
        matches.detected_events + matches.missed_events,
        matches.total_events
    );
    if let Some(auroc) = first.metrics.auroc {
        assert!(auroc > 0.5, "vibration spikes should rank above normal rows: {auroc}");
    }
    assert!(first.metrics.false_alarms_per_hour >= 0.0);
    assert!(first.model.is_some());
}

#[test]
fn change_point_on_constant_series_detects_nothing() {
    let series = MultiChannelSeries::new(vec![Channel::new("flare_flow", vec![5.0; 600])])
        .expect("valid series");
    let dataset = Dataset::new(series, GroundTruth::default()).expect("valid dataset");
    let spec = PipelineSpec {
        test_split_ratio: 1.0,
        detector: DetectorConfig::ChangePoint(ChangePointSpec::default()),
        ..PipelineSpec::default()
    };
    let output = run_pipeline(&dataset, &spec, &ExecutionContext::new()).expect("pipeline");
    assert!(output.detections.is_empty());
    assert_eq!(output.metrics.false_alarms_per_hour, 0.0);
    assert_eq!(output.metrics.detection_rate, 0.0);
    assert_eq!(output.metrics.mean_delay, 0.0);
    assert_eq!(output.metrics.threshold, 10.0);
}

#[test]
fn comparison_reports_reduction_against_static_baseline() {
    let dataset = simulate_flare(&FlareSimulation::default()).expect("simulate");
    let spec = PipelineSpec {
        test_split_ratio: 1.0,
        detector: DetectorConfig::ChangePoint(ChangePointSpec::default()),
        ..PipelineSpec::default()
    };
    let telemetry = RecordingTelemetry::default();
    let ctx = ExecutionContext::new().with_telemetry_sink(&telemetry);
    let comparison = run_comparison(
        &dataset,
        &spec,
        &DetectorConfig::StaticBaseline(StaticBaselineSpec::default()),
        &ctx,
    )
    .expect("comparison should run");

    assert_eq!(comparison.candidate.detector, "change_point");
    assert_eq!(comparison.baseline.detector, "static_baseline");
    assert_eq!(
        comparison.false_alarm_reduction_percent,
        false_alarm_reduction_percent(
            comparison.baseline.matches.false_positives,
            comparison.candidate.matches.false_positives,
        )
    );
    // with the whole series under test every event is scored
    assert_eq!(comparison.candidate.matches.total_events, 4);
    assert!(comparison.candidate.completed);

    let keys = telemetry
        .keys
        .lock()
        .expect("telemetry lock should not be poisoned");
    assert!(keys.iter().any(|key| key == "changepoint.cost_evals"));

    let encoded = serde_json::to_value(&comparison).expect("comparison should serialize");
    assert!(encoded["candidate"]["metrics"]["AUROC"].is_null());
    assert!(encoded["false_alarm_reduction_percent"].is_number());
}

#[test]
fn cancelled_change_point_run_reports_incomplete() {
    let dataset = simulate_flare(&FlareSimulation::default()).expect("simulate");
    let spec = PipelineSpec {
        test_split_ratio: 1.0,
        detector: DetectorConfig::ChangePoint(ChangePointSpec {
            cancel_check_every: 1,
            ..ChangePointSpec::default()
        }),
        ..PipelineSpec::default()
    };
    let cancel = CancelToken::new();
    cancel.cancel();
    let ctx = ExecutionContext::new().with_cancel(&cancel);
    let output = run_pipeline(&dataset, &spec, &ctx).expect("cancellation returns a partial run");
    assert!(!output.completed);
}

#[test]
fn persisted_model_reloads_and_scores_bit_for_bit() {
    let dataset = simulate_compressor(&CompressorSimulation {
        n_samples: 600,
        n_anomalies: 8,
        seed: 11,
    })
    .expect("simulate");
    let spec = PipelineSpec {
        window_size: 15,
        ..PipelineSpec::default()
    };
    let output = run_pipeline(&dataset, &spec, &ExecutionContext::new()).expect("pipeline");
    let model = output.model.expect("ensemble runs produce a model");

    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("model.json");
    model.save(&path).expect("model should save");
    let reloaded = ModelHandle::load(&path).expect("model should load");
    assert_eq!(reloaded, model);

    let rows = model
        .windower()
        .transform(dataset.series())
        .expect("windowing should succeed");
    let original = model.score_matrix(&rows).expect("score");
    let restored = reloaded.score_matrix(&rows).expect("score");
    assert_eq!(original.len(), rows.n_rows());
    for (a, b) in original.iter().zip(&restored) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
    assert_eq!(
        model.detect(dataset.series()).expect("detect"),
        reloaded.detect(dataset.series()).expect("detect")
    );
}
