// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::dataset::Dataset;
use crate::model::ModelHandle;
use crate::spec::{DetectorConfig, EnsembleSpec, PipelineSpec};
use imon_core::{Detections, Diagnostics, ExecutionContext, GroundTruth, ImonError};
use imon_detect::{
    EventDetector, IsolationEnsemble, KernelPelt, NoveltyScorer, ScorerFit, StaticBaseline,
};
use imon_eval::{
    MatchResult, MetricsRecord, ThresholdCalibrator, aggregate, false_alarm_reduction_percent,
    match_events,
};
use imon_features::{FeatureMatrix, FeatureWindower};
use serde::Serialize;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info};

/// Everything one pipeline run produced on its test split.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineOutput {
    pub detector: &'static str,
    pub metrics: MetricsRecord,
    pub matches: MatchResult,
    /// Flagged indices on the original time axis.
    pub detections: Detections,
    /// First time index of the test split; the split runs to the series end.
    pub test_start: usize,
    pub test_rows: usize,
    /// False when a cancellable stage stopped early.
    pub completed: bool,
    pub diagnostics: Diagnostics,
    /// Present for the ensemble strategy only.
    #[serde(skip)]
    pub model: Option<ModelHandle>,
}

/// Two strategies evaluated on the same dataset and split.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonOutput {
    pub candidate: PipelineOutput,
    pub baseline: PipelineOutput,
    pub false_alarm_reduction_percent: f64,
}

struct Split {
    train: FeatureMatrix,
    test: FeatureMatrix,
    test_start: usize,
    test_labels: Vec<bool>,
    test_events: GroundTruth,
}

fn split_chronologically(
    dataset: &Dataset,
    windower: &FeatureWindower,
    test_split_ratio: f64,
) -> Result<Split, ImonError> {
    let features = windower.transform(dataset.series())?;
    let n_rows = features.n_rows();
    if n_rows == 0 {
        return Err(ImonError::invalid_input(format!(
            "window={} leaves no feature rows for a series of length {}",
            windower.window(),
            dataset.len()
        )));
    }

    let train_rows = ((1.0 - test_split_ratio) * n_rows as f64).floor() as usize;
    let (train, test) = features.split_at(train_rows.min(n_rows))?;
    let Some(test_start) = test.first_index() else {
        return Err(ImonError::invalid_input(format!(
            "test split is empty: {n_rows} rows with test_split_ratio={test_split_ratio}"
        )));
    };

    let labels = dataset.labels();
    let test_labels = test.align_labels(&labels)?;
    let test_events = dataset.events().clipped(test_start, dataset.len());
    debug!(
        n_rows,
        train_rows = train.n_rows(),
        test_rows = test.n_rows(),
        test_start,
        test_events = test_events.len(),
        "chronological split"
    );

    Ok(Split {
        train,
        test,
        test_start,
        test_labels,
        test_events,
    })
}

/// Runs one detection strategy end to end: window, split, fit and calibrate
/// where the strategy needs it, detect on the test split, match, aggregate.
pub fn run_pipeline(
    dataset: &Dataset,
    spec: &PipelineSpec,
    ctx: &ExecutionContext<'_>,
) -> Result<PipelineOutput, ImonError> {
    spec.validate()?;
    let started = Instant::now();
    let windower = FeatureWindower::new(spec.window_size);
    let split = split_chronologically(dataset, &windower, spec.test_split_ratio)?;
    ctx.report_progress(0.1);

    let mut output = match &spec.detector {
        DetectorConfig::Ensemble(ensemble) => {
            run_ensemble(dataset, spec, ensemble, windower, &split, ctx)?
        }
        DetectorConfig::StaticBaseline(baseline) => {
            let detector = StaticBaseline::new(baseline.to_config())?;
            let values = test_values(dataset, baseline.channel.as_deref(), split.test_start)?;
            let threshold = detector.threshold(values).ok_or_else(|| {
                ImonError::invalid_input(format!(
                    "static baseline needs >= 2 test samples; got {}",
                    values.len()
                ))
            })?;
            run_direct(&detector, "static_baseline", values, threshold, &split, ctx)?
        }
        DetectorConfig::ChangePoint(change_point) => {
            let detector = KernelPelt::new(change_point.to_config())?;
            let values = test_values(dataset, change_point.channel.as_deref(), split.test_start)?;
            run_direct(
                &detector,
                "change_point",
                values,
                change_point.penalty,
                &split,
                ctx,
            )?
        }
    };

    if output.diagnostics.runtime_ms.is_none() {
        output.diagnostics.runtime_ms =
            Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
    }
    ctx.report_progress(1.0);
    info!(
        detector = output.detector,
        detections = output.detections.len(),
        true_positives = output.matches.true_positives,
        false_positives = output.matches.false_positives,
        detection_rate = output.metrics.detection_rate,
        completed = output.completed,
        "pipeline run finished"
    );
    Ok(output)
}

/// Runs `spec` and the same spec with `baseline` swapped in, then reports
/// the candidate's false-alarm reduction relative to the baseline.
pub fn run_comparison(
    dataset: &Dataset,
    spec: &PipelineSpec,
    baseline: &DetectorConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<ComparisonOutput, ImonError> {
    let candidate = run_pipeline(dataset, spec, ctx)?;
    let baseline = run_pipeline(dataset, &spec.with_detector(baseline.clone()), ctx)?;
    let reduction = false_alarm_reduction_percent(
        baseline.matches.false_positives,
        candidate.matches.false_positives,
    );
    info!(
        candidate = candidate.detector,
        baseline = baseline.detector,
        baseline_false_positives = baseline.matches.false_positives,
        candidate_false_positives = candidate.matches.false_positives,
        reduction_percent = reduction,
        "comparison finished"
    );
    Ok(ComparisonOutput {
        candidate,
        baseline,
        false_alarm_reduction_percent: reduction,
    })
}

fn test_values<'a>(
    dataset: &'a Dataset,
    channel: Option<&str>,
    test_start: usize,
) -> Result<&'a [f64], ImonError> {
    let channel = dataset.series().channel_or_first(channel)?;
    Ok(&channel.values[test_start..])
}

fn run_ensemble(
    dataset: &Dataset,
    spec: &PipelineSpec,
    ensemble: &EnsembleSpec,
    windower: FeatureWindower,
    split: &Split,
    ctx: &ExecutionContext<'_>,
) -> Result<PipelineOutput, ImonError> {
    let labels = dataset.labels();
    let normal_mask: Vec<bool> = split
        .train
        .align_labels(&labels)?
        .into_iter()
        .map(|anomalous| !anomalous)
        .collect();
    let normal_train = split.train.select_rows(&normal_mask)?;

    let fitted = IsolationEnsemble::new(ensemble.to_config(spec.seed))?.fit(&normal_train)?;
    ctx.report_progress(0.5);

    let train_scores = fitted.score(&normal_train)?;
    let threshold = ThresholdCalibrator::new(spec.alarm_quantile)?.calibrate(&train_scores)?;

    let test_scores = fitted.score(&split.test)?;
    let detections = threshold.detections(&test_scores, split.test_start)?;
    let matches = match_events(&detections, &split.test_events);
    let metrics = aggregate(
        Some(&test_scores),
        &split.test_labels,
        threshold.value,
        &matches,
    )?;

    let diagnostics = Diagnostics {
        n: normal_train.n_rows(),
        d: normal_train.n_cols(),
        notes: vec![
            format!("trees={}", fitted.n_trees()),
            format!("sample_size={}", fitted.sample_size()),
            format!("threshold.quantile={}", threshold.quantile),
        ],
        algorithm: Cow::Borrowed("isolation-ensemble"),
        seed: Some(spec.seed),
        ..Diagnostics::default()
    };
    let column_names = split.test.column_names().to_vec();
    let model = ModelHandle::new(windower, fitted, threshold, column_names)?;

    Ok(PipelineOutput {
        detector: "ensemble",
        metrics,
        matches,
        detections,
        test_start: split.test_start,
        test_rows: split.test.n_rows(),
        completed: true,
        diagnostics,
        model: Some(model),
    })
}

/// Strategies that flag indices on the raw test channel without scores.
fn run_direct<D: EventDetector>(
    detector: &D,
    kind: &'static str,
    values: &[f64],
    threshold: f64,
    split: &Split,
    ctx: &ExecutionContext<'_>,
) -> Result<PipelineOutput, ImonError> {
    let run = detector.detect(values, ctx)?;
    let detections = Detections::from_unsorted(
        run.detections
            .iter()
            .map(|index| index + split.test_start)
            .collect(),
    );
    let matches = match_events(&detections, &split.test_events);
    let metrics = aggregate(None, &split.test_labels, threshold, &matches)?;

    Ok(PipelineOutput {
        detector: kind,
        metrics,
        matches,
        detections,
        test_start: split.test_start,
        test_rows: split.test.n_rows(),
        completed: run.completed,
        diagnostics: run.diagnostics,
        model: None,
    })
}
