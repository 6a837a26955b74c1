// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::ImonError;

/// Ascending, deduplicated set of time indices flagged anomalous.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<usize>", into = "Vec<usize>")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detections {
    indices: Vec<usize>,
}

impl Detections {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts and deduplicates arbitrary indices.
    pub fn from_unsorted(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Flags every position whose score is strictly above `threshold`.
    ///
    /// `offset` is added to each position so row indices map back onto the
    /// original time axis.
    pub fn from_scores(scores: &[f64], threshold: f64, offset: usize) -> Result<Self, ImonError> {
        if !threshold.is_finite() {
            return Err(ImonError::invalid_input(format!(
                "threshold must be finite; got {threshold}"
            )));
        }
        let mut indices = Vec::new();
        for (position, &score) in scores.iter().enumerate() {
            if !score.is_finite() {
                return Err(ImonError::invalid_input(format!(
                    "scores must be finite; scores[{position}]={score}"
                )));
            }
            if score > threshold {
                let index = position.checked_add(offset).ok_or_else(|| {
                    ImonError::resource_limit("detection index overflow while applying offset")
                })?;
                indices.push(index);
            }
        }
        Ok(Self { indices })
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

impl From<Vec<usize>> for Detections {
    fn from(indices: Vec<usize>) -> Self {
        Self::from_unsorted(indices)
    }
}

impl From<Detections> for Vec<usize> {
    fn from(detections: Detections) -> Self {
        detections.indices
    }
}
