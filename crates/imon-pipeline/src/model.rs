// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::{Detections, ImonError, MultiChannelSeries};
use imon_detect::{FittedIsolationEnsemble, NoveltyScorer};
use imon_eval::Threshold;
use imon_features::{FeatureMatrix, FeatureWindower};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Version tag written into persisted model documents.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Immutable bundle of everything needed to score new data: the windower,
/// the fitted ensemble, its calibrated threshold, and the expected feature
/// column names.
///
/// Built once by the pipeline and handed to serving code explicitly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelDocument", into = "ModelDocument")]
pub struct ModelHandle {
    windower: FeatureWindower,
    scorer: FittedIsolationEnsemble,
    threshold: Threshold,
    feature_names: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
struct ModelDocument {
    format_version: u32,
    windower: FeatureWindower,
    scorer: FittedIsolationEnsemble,
    threshold: Threshold,
    feature_names: Vec<String>,
}

impl TryFrom<ModelDocument> for ModelHandle {
    type Error = ImonError;

    fn try_from(doc: ModelDocument) -> Result<Self, Self::Error> {
        if doc.format_version != MODEL_FORMAT_VERSION {
            return Err(ImonError::serialization(format!(
                "unsupported model format_version={}; expected {MODEL_FORMAT_VERSION}",
                doc.format_version
            )));
        }
        Self::new(doc.windower, doc.scorer, doc.threshold, doc.feature_names)
    }
}

impl From<ModelHandle> for ModelDocument {
    fn from(handle: ModelHandle) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            windower: handle.windower,
            scorer: handle.scorer,
            threshold: handle.threshold,
            feature_names: handle.feature_names,
        }
    }
}

impl ModelHandle {
    pub fn new(
        windower: FeatureWindower,
        scorer: FittedIsolationEnsemble,
        threshold: Threshold,
        feature_names: Vec<String>,
    ) -> Result<Self, ImonError> {
        if feature_names.len() != scorer.n_features() {
            return Err(ImonError::invalid_input(format!(
                "feature name count {} does not match model width {}",
                feature_names.len(),
                scorer.n_features()
            )));
        }
        if !threshold.value.is_finite() {
            return Err(ImonError::invalid_input(format!(
                "threshold must be finite; got {}",
                threshold.value
            )));
        }
        Ok(Self {
            windower,
            scorer,
            threshold,
            feature_names,
        })
    }

    pub fn windower(&self) -> &FeatureWindower {
        &self.windower
    }

    pub fn scorer(&self) -> &FittedIsolationEnsemble {
        &self.scorer
    }

    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Raw scores for an already windowed matrix with matching columns.
    pub fn score_matrix(&self, rows: &FeatureMatrix) -> Result<Vec<f64>, ImonError> {
        if rows.column_names() != self.feature_names.as_slice() {
            return Err(ImonError::invalid_input(format!(
                "feature columns do not match the model: expected [{}], got [{}]",
                self.feature_names.join(", "),
                rows.column_names().join(", ")
            )));
        }
        self.scorer.score(rows)
    }

    /// Raw score for a single feature vector in model column order.
    pub fn score_row(&self, row: &[f64]) -> Result<f64, ImonError> {
        self.scorer.score_row(row)
    }

    /// Windows `series`, scores every row, and returns the flagged indices on
    /// the series' own time axis.
    pub fn detect(&self, series: &MultiChannelSeries) -> Result<Detections, ImonError> {
        let rows = self.windower.transform(series)?;
        let scores = self.score_matrix(&rows)?;
        self.threshold
            .detections(&scores, rows.first_index().unwrap_or(0))
    }

    pub fn to_json_string(&self) -> Result<String, ImonError> {
        serde_json::to_string(self)
            .map_err(|err| ImonError::serialization(format!("failed to encode model: {err}")))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ImonError> {
        serde_json::from_str(raw)
            .map_err(|err| ImonError::serialization(format!("failed to decode model: {err}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), ImonError> {
        let encoded = self.to_json_string()?;
        fs::write(path, encoded).map_err(|err| {
            ImonError::serialization(format!("failed to write '{}': {err}", path.display()))
        })?;
        info!(path = %path.display(), trees = self.scorer.n_trees(), "saved model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ImonError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            ImonError::serialization(format!("failed to read '{}': {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}
