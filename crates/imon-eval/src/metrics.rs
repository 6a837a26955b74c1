// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::MatchResult;
use imon_core::ImonError;
use std::collections::BTreeMap;
use tracing::warn;

/// Final per-run metrics, keyed for the downstream metrics sink.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsRecord {
    #[cfg_attr(feature = "serde", serde(rename = "AUROC"))]
    pub auroc: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "AUPRC"))]
    pub auprc: Option<f64>,
    pub threshold: f64,
    #[cfg_attr(feature = "serde", serde(rename = "falseAlarmsPerHour"))]
    pub false_alarms_per_hour: f64,
    #[cfg_attr(feature = "serde", serde(rename = "detectionRate"))]
    pub detection_rate: f64,
    #[cfg_attr(feature = "serde", serde(rename = "meanDelay"))]
    pub mean_delay: f64,
}

impl MetricsRecord {
    /// Flat `name -> value` mapping; undefined ranking metrics map to `None`.
    pub fn to_flat_map(&self) -> BTreeMap<&'static str, Option<f64>> {
        BTreeMap::from([
            ("AUROC", self.auroc),
            ("AUPRC", self.auprc),
            ("threshold", Some(self.threshold)),
            ("falseAlarmsPerHour", Some(self.false_alarms_per_hour)),
            ("detectionRate", Some(self.detection_rate)),
            ("meanDelay", Some(self.mean_delay)),
        ])
    }
}

fn validate_scored(scores: &[f64], labels: &[bool]) -> Result<(usize, usize), ImonError> {
    if scores.len() != labels.len() {
        return Err(ImonError::invalid_input(format!(
            "scores/labels length mismatch: {} scores, {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if let Some(pos) = scores.iter().position(|score| !score.is_finite()) {
        return Err(ImonError::invalid_input(format!(
            "scores must be finite; scores[{pos}]={}",
            scores[pos]
        )));
    }
    let positives = labels.iter().filter(|&&label| label).count();
    Ok((positives, labels.len() - positives))
}

/// Rank-based AUROC with average ranks for ties; `None` if a class is absent.
pub fn auroc(scores: &[f64], labels: &[bool]) -> Result<Option<f64>, ImonError> {
    let (positives, negatives) = validate_scored(scores, labels)?;
    if positives == 0 || negatives == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_unstable_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0usize;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: the tie group spans ranks start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| labels[i]).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok(Some(u / (p * negatives as f64)))
}

/// Average precision: `sum_k (R_k - R_{k-1}) * P_k` over distinct score
/// thresholds in descending order. `None` if a class is absent.
pub fn auprc(scores: &[f64], labels: &[bool]) -> Result<Option<f64>, ImonError> {
    let (positives, negatives) = validate_scored(scores, labels)?;
    if positives == 0 || negatives == 0 {
        return Ok(None);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_unstable_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ap = 0.0;
    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut previous_recall = 0.0;
    let mut start = 0usize;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        tp += order[start..end].iter().filter(|&&i| labels[i]).count();
        seen += end - start;

        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - previous_recall) * precision;
        previous_recall = recall;
        start = end;
    }
    Ok(Some(ap))
}

/// `false_positives / (negative_minutes / 60)` with `negative_minutes >= 1`.
pub fn false_alarms_per_hour(false_positives: usize, negative_minutes: usize) -> f64 {
    false_positives as f64 / (negative_minutes.max(1) as f64 / 60.0)
}

/// Percent reduction of false positives relative to a baseline; 0 when the
/// baseline raised none.
pub fn false_alarm_reduction_percent(baseline_fp: usize, candidate_fp: usize) -> f64 {
    if baseline_fp == 0 {
        return 0.0;
    }
    (baseline_fp as f64 - candidate_fp as f64) / baseline_fp as f64 * 100.0
}

/// Reduces scores, labels, and matches of one scored split into a record.
///
/// `scores` is `None` for detectors that produce detections directly; the
/// ranking metrics are then undefined.
pub fn aggregate(
    scores: Option<&[f64]>,
    labels: &[bool],
    threshold: f64,
    matches: &MatchResult,
) -> Result<MetricsRecord, ImonError> {
    let (auroc, auprc) = match scores {
        Some(scores) => (auroc(scores, labels)?, auprc(scores, labels)?),
        None => (None, None),
    };
    if scores.is_some() && auroc.is_none() {
        warn!(
            rows = labels.len(),
            "scored split holds a single label class; AUROC and AUPRC are undefined"
        );
    }

    let negative_minutes = labels.iter().filter(|&&label| !label).count();
    Ok(MetricsRecord {
        auroc,
        auprc,
        threshold,
        false_alarms_per_hour: false_alarms_per_hour(matches.false_positives, negative_minutes),
        detection_rate: matches.detection_rate(),
        mean_delay: matches.mean_delay(),
    })
}
