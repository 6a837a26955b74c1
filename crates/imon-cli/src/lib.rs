// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{Detections, ExecutionContext, ImonError};
use imon_pipeline::{Dataset, ModelHandle, PipelineOutput, PipelineSpec, run_pipeline};
use serde::Serialize;

/// Parses a JSON pipeline spec; an empty document yields the defaults.
pub fn parse_pipeline_spec(raw: &str) -> Result<PipelineSpec, ImonError> {
    if raw.trim().is_empty() {
        return Ok(PipelineSpec::default());
    }
    let spec: PipelineSpec = serde_json::from_str(raw)
        .map_err(|err| ImonError::invalid_input(format!("invalid pipeline JSON: {err}")))?;
    spec.validate()?;
    Ok(spec)
}

pub fn parse_dataset(raw: &str) -> Result<Dataset, ImonError> {
    serde_json::from_str(raw)
        .map_err(|err| ImonError::invalid_input(format!("invalid dataset JSON: {err}")))
}

/// Parses a JSON pipeline spec and runs it on `dataset`.
pub fn run_pipeline_json(dataset: &Dataset, pipeline_json: &str) -> Result<PipelineOutput, ImonError> {
    let spec = parse_pipeline_spec(pipeline_json)?;
    run_pipeline(dataset, &spec, &ExecutionContext::new())
}

/// Raw scores of a persisted model over a dataset, without event matching.
#[derive(Clone, Debug, Serialize)]
pub struct ScoreReport {
    pub rows: usize,
    /// Time index of the first scored row.
    pub first_index: usize,
    pub threshold: f64,
    pub scores: Vec<f64>,
    pub detections: Detections,
}

pub fn score_dataset(model: &ModelHandle, dataset: &Dataset) -> Result<ScoreReport, ImonError> {
    let rows = model.windower().transform(dataset.series())?;
    let scores = model.score_matrix(&rows)?;
    let first_index = rows.first_index().unwrap_or(model.windower().first_index());
    let detections = model.threshold().detections(&scores, first_index)?;
    Ok(ScoreReport {
        rows: rows.n_rows(),
        first_index,
        threshold: model.threshold().value,
        scores,
        detections,
    })
}
