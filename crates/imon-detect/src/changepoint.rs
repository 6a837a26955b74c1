// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::scorer::{DetectionRun, EventDetector, validate_values};
use imon_core::{Detections, Diagnostics, ExecutionContext, ImonError, PruningStats};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_PENALTY: f64 = 10.0;
const DEFAULT_MIN_SEGMENT_LEN: usize = 2;
const DEFAULT_JUMP: usize = 5;
const DEFAULT_CANCEL_CHECK_EVERY: usize = 64;
const LARGE_PREFIX_WARNING_BYTES: usize = 256 * 1024 * 1024;

/// Configuration for [`KernelPelt`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct KernelPeltConfig {
    /// Cost added per segment boundary.
    pub penalty: f64,
    /// RBF bandwidth. `None` resolves to `1 / median(pairwise squared distance)`.
    pub gamma: Option<f64>,
    pub min_segment_len: usize,
    /// Boundaries are only considered at multiples of `jump`.
    pub jump: usize,
    pub cancel_check_every: usize,
}

impl Default for KernelPeltConfig {
    fn default() -> Self {
        Self {
            penalty: DEFAULT_PENALTY,
            gamma: None,
            min_segment_len: DEFAULT_MIN_SEGMENT_LEN,
            jump: DEFAULT_JUMP,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        }
    }
}

impl KernelPeltConfig {
    fn validate(&self) -> Result<(), ImonError> {
        if !self.penalty.is_finite() || self.penalty <= 0.0 {
            return Err(ImonError::invalid_input(format!(
                "KernelPeltConfig.penalty must be finite and > 0; got {}",
                self.penalty
            )));
        }
        if let Some(gamma) = self.gamma {
            if !gamma.is_finite() || gamma <= 0.0 {
                return Err(ImonError::invalid_input(format!(
                    "KernelPeltConfig.gamma must be finite and > 0; got {gamma}"
                )));
            }
        }
        if self.min_segment_len == 0 {
            return Err(ImonError::invalid_input(
                "KernelPeltConfig.min_segment_len must be >= 1; got 0",
            ));
        }
        if self.jump == 0 {
            return Err(ImonError::invalid_input(
                "KernelPeltConfig.jump must be >= 1; got 0",
            ));
        }
        Ok(())
    }

    fn normalized_cancel_check_every(&self) -> usize {
        self.cancel_check_every.max(1)
    }
}

/// Segmentation returned by [`KernelPelt::segment`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ChangePointResult {
    /// Segment ends, strictly increasing; the last entry is the end of the
    /// searched prefix (`n` for a completed run).
    pub breakpoints: Vec<usize>,
    /// `breakpoints` without the terminal index.
    pub change_points: Vec<usize>,
    /// Penalized objective at the last completed target.
    pub objective: f64,
    pub completed: bool,
    pub diagnostics: Diagnostics,
}

/// Penalized exact partitioning (PELT) under an RBF kernel dispersion cost.
///
/// Segment cost is `sum_i k(x_i, x_i) - (1 / len) * sum_{i,j} k(x_i, x_j)`,
/// evaluated in O(1) from a 2D prefix sum of kernel values. The prefix table
/// holds `(n + 1)^2` values.
#[derive(Clone, Debug)]
pub struct KernelPelt {
    config: KernelPeltConfig,
}

#[derive(Default, Clone, Copy, Debug)]
struct RuntimeStats {
    cost_evals: usize,
    candidates_considered: usize,
    candidates_pruned: usize,
}

struct KernelPrefix {
    n: usize,
    prefix: Vec<f64>,
}

impl KernelPrefix {
    /// Returns `None` when cancelled mid-build.
    fn build(
        values: &[f64],
        gamma: f64,
        ctx: &ExecutionContext<'_>,
        cancel_check_every: usize,
    ) -> Option<Self> {
        let n = values.len();
        let stride = n + 1;
        let mut prefix = vec![0.0; stride * stride];
        for row in 0..n {
            if ctx.is_cancelled_every(row, cancel_check_every) {
                return None;
            }
            let mut row_sum = 0.0;
            for col in 0..n {
                let delta = values[row] - values[col];
                row_sum += (-gamma * delta * delta).exp();
                prefix[(row + 1) * stride + col + 1] = prefix[row * stride + col + 1] + row_sum;
            }
        }
        Some(Self { n, prefix })
    }

    fn block_sum(&self, start: usize, end: usize) -> f64 {
        let stride = self.n + 1;
        self.prefix[end * stride + end] - self.prefix[start * stride + end]
            - self.prefix[end * stride + start]
            + self.prefix[start * stride + start]
    }

    /// RBF diagonal is 1, so the diagonal sum is the segment length.
    fn segment_cost(&self, start: usize, end: usize) -> Result<f64, ImonError> {
        let len = (end - start) as f64;
        let mut cost = len - self.block_sum(start, end) / len;
        if cost < 0.0 && cost > -1.0e-9 {
            cost = 0.0;
        }
        if !cost.is_finite() {
            return Err(ImonError::numerical_issue(format!(
                "non-finite segment cost at [{start}, {end})"
            )));
        }
        Ok(cost)
    }
}

/// `1 / median` of squared pairwise distances, or 1 when the median is zero.
fn resolve_gamma(values: &[f64]) -> f64 {
    let n = values.len();
    let mut dists = Vec::with_capacity(n.saturating_mul(n.saturating_sub(1)) / 2);
    for left in 0..n {
        for right in left + 1..n {
            let delta = values[left] - values[right];
            dists.push(delta * delta);
        }
    }
    if dists.is_empty() {
        return 1.0;
    }

    let count = dists.len();
    let mid = count / 2;
    let (lower, upper, _) = dists.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    let median = if count % 2 == 1 {
        upper
    } else {
        let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        0.5 * (below + upper)
    };
    if median > 0.0 { 1.0 / median } else { 1.0 }
}

fn checked_counter_increment(counter: &mut usize, name: &str) -> Result<(), ImonError> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| ImonError::resource_limit(format!("{name} counter overflow")))?;
    Ok(())
}

fn build_targets(n: usize, min_segment_len: usize, jump: usize) -> Vec<usize> {
    let mut targets: Vec<usize> = (jump..n)
        .step_by(jump)
        .filter(|&t| t >= min_segment_len)
        .collect();
    targets.push(n);
    targets
}

fn reconstruct_breakpoints(end: usize, last_cp: &[usize]) -> Result<Vec<usize>, ImonError> {
    let mut reverse = vec![end];
    let mut cursor = end;
    while cursor > 0 {
        let tau = last_cp[cursor];
        if tau == usize::MAX || tau >= cursor {
            return Err(ImonError::numerical_issue(format!(
                "invalid backtrack state at t={cursor}: predecessor={tau}"
            )));
        }
        if tau == 0 {
            break;
        }
        reverse.push(tau);
        cursor = tau;
    }
    reverse.reverse();
    Ok(reverse)
}

impl KernelPelt {
    pub fn new(config: KernelPeltConfig) -> Result<Self, ImonError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &KernelPeltConfig {
        &self.config
    }

    /// Full segmentation, including breakpoints and objective.
    ///
    /// Polls `ctx` for cancellation every `cancel_check_every` targets; a
    /// cancelled run returns the segmentation of the last completed prefix
    /// with `completed = false`.
    pub fn segment(
        &self,
        values: &[f64],
        ctx: &ExecutionContext<'_>,
    ) -> Result<ChangePointResult, ImonError> {
        validate_values(values, "KernelPelt")?;

        let started_at = Instant::now();
        let n = values.len();
        let beta = self.config.penalty;
        let min_segment_len = self.config.min_segment_len;
        let cancel_check_every = self.config.normalized_cancel_check_every();
        let mut notes = vec![];
        let mut warnings = vec![];
        let mut runtime = RuntimeStats::default();

        let finish = |breakpoints: Vec<usize>,
                      objective: f64,
                      completed: bool,
                      notes: Vec<String>,
                      warnings: Vec<String>,
                      runtime: RuntimeStats| {
            let runtime_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            ctx.record_scalar("changepoint.cost_evals", runtime.cost_evals as f64);
            ctx.record_scalar(
                "changepoint.candidates_considered",
                runtime.candidates_considered as f64,
            );
            ctx.record_scalar(
                "changepoint.candidates_pruned",
                runtime.candidates_pruned as f64,
            );
            ctx.record_scalar("changepoint.runtime_ms", runtime_ms as f64);

            let change_points = match breakpoints.split_last() {
                Some((_, interior)) => interior.to_vec(),
                None => vec![],
            };
            ChangePointResult {
                change_points,
                breakpoints,
                objective,
                completed,
                diagnostics: Diagnostics {
                    n,
                    d: 1,
                    runtime_ms: Some(runtime_ms),
                    notes,
                    warnings,
                    algorithm: Cow::Borrowed("kernel-pelt"),
                    pruning_stats: Some(PruningStats {
                        candidates_considered: runtime.candidates_considered,
                        candidates_pruned: runtime.candidates_pruned,
                    }),
                    ..Diagnostics::default()
                },
            }
        };

        if n < min_segment_len.saturating_mul(2) {
            notes.push(format!(
                "n={n} is too short for two segments of min_segment_len={min_segment_len}"
            ));
            ctx.report_progress(1.0);
            let breakpoints = if n == 0 { vec![] } else { vec![n] };
            return Ok(finish(breakpoints, 0.0, true, notes, warnings, runtime));
        }

        let gamma = match self.config.gamma {
            Some(gamma) => gamma,
            None => {
                let gamma = resolve_gamma(values);
                notes.push(format!("kernel.rbf.gamma_auto={gamma}"));
                gamma
            }
        };

        let prefix_bytes = (n + 1)
            .checked_mul(n + 1)
            .and_then(|cells| cells.checked_mul(std::mem::size_of::<f64>()))
            .ok_or_else(|| ImonError::resource_limit("kernel prefix table size overflow"))?;
        if prefix_bytes > LARGE_PREFIX_WARNING_BYTES {
            let message = format!("large kernel prefix table: {prefix_bytes} bytes for n={n}");
            warn!(n, prefix_bytes, "large kernel prefix table");
            warnings.push(message);
        }

        let Some(kernel) = KernelPrefix::build(values, gamma, ctx, cancel_check_every) else {
            notes.push("cancelled while building kernel prefix table".to_string());
            return Ok(finish(vec![], 0.0, false, notes, warnings, runtime));
        };

        let targets = build_targets(n, min_segment_len, self.config.jump);
        let total_targets = targets.len().max(1);

        let mut f = vec![f64::INFINITY; n + 1];
        let mut last_cp = vec![usize::MAX; n + 1];
        f[0] = -beta;
        last_cp[0] = 0;

        let mut candidate_set = vec![0usize];
        let mut last_completed = 0usize;
        let mut completed = true;

        for (target_idx, &t) in targets.iter().enumerate() {
            if ctx.is_cancelled_every(target_idx, cancel_check_every) {
                completed = false;
                break;
            }

            let mut scored = vec![None; candidate_set.len()];
            let mut best_cost = f64::INFINITY;
            let mut best_tau = usize::MAX;

            for (idx, &tau) in candidate_set.iter().enumerate() {
                if t <= tau || t - tau < min_segment_len || !f[tau].is_finite() {
                    continue;
                }

                let segment_cost = kernel.segment_cost(tau, t)?;
                checked_counter_increment(&mut runtime.cost_evals, "cost_evals")?;
                checked_counter_increment(
                    &mut runtime.candidates_considered,
                    "candidates_considered",
                )?;

                let score_no_penalty = f[tau] + segment_cost;
                let candidate = score_no_penalty + beta;
                if !candidate.is_finite() {
                    return Err(ImonError::numerical_issue(format!(
                        "non-finite objective at t={t}, tau={tau}: F(tau)={}, segment_cost={segment_cost}",
                        f[tau]
                    )));
                }
                scored[idx] = Some(score_no_penalty);

                if candidate < best_cost || (candidate == best_cost && tau < best_tau) {
                    best_cost = candidate;
                    best_tau = tau;
                }
            }

            if best_tau == usize::MAX {
                return Err(ImonError::numerical_issue(format!(
                    "no feasible segmentation at t={t} with min_segment_len={min_segment_len}"
                )));
            }

            f[t] = best_cost;
            last_cp[t] = best_tau;
            last_completed = t;

            let mut next_candidate_set = Vec::with_capacity(candidate_set.len() + 1);
            for (idx, &tau) in candidate_set.iter().enumerate() {
                match scored[idx] {
                    Some(score_no_penalty) if score_no_penalty >= best_cost => {
                        checked_counter_increment(
                            &mut runtime.candidates_pruned,
                            "candidates_pruned",
                        )?;
                    }
                    _ => next_candidate_set.push(tau),
                }
            }
            if t < n {
                next_candidate_set.push(t);
            }
            candidate_set = next_candidate_set;

            ctx.report_progress((target_idx + 1) as f32 / total_targets as f32);
        }

        let (breakpoints, objective) = if last_completed == 0 {
            (vec![], 0.0)
        } else {
            (reconstruct_breakpoints(last_completed, &last_cp)?, f[last_completed])
        };

        if !completed {
            notes.push(format!("cancelled after prefix [0, {last_completed})"));
        }
        notes.push(format!(
            "penalty={beta}, final_objective={objective}, change_count={}",
            breakpoints.len().saturating_sub(1)
        ));
        debug!(
            n,
            gamma,
            cost_evals = runtime.cost_evals,
            candidates_pruned = runtime.candidates_pruned,
            completed,
            "kernel pelt search finished"
        );

        Ok(finish(breakpoints, objective, completed, notes, warnings, runtime))
    }
}

impl EventDetector for KernelPelt {
    fn detect(&self, values: &[f64], ctx: &ExecutionContext<'_>) -> Result<DetectionRun, ImonError> {
        let result = self.segment(values, ctx)?;
        Ok(DetectionRun {
            detections: Detections::from_unsorted(result.change_points),
            completed: result.completed,
            diagnostics: result.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{KernelPelt, KernelPeltConfig, build_targets, resolve_gamma};
    use crate::scorer::EventDetector;
    use imon_core::{CancelToken, ExecutionContext, ProgressSink, TelemetrySink};
    use std::sync::Mutex;

    fn step_signal(levels: &[(usize, f64)]) -> Vec<f64> {
        levels
            .iter()
            .flat_map(|&(len, level)| std::iter::repeat(level).take(len))
            .collect()
    }

    #[derive(Default)]
    struct RecordingSink {
        progress: Mutex<Vec<f32>>,
        scalars: Mutex<Vec<(&'static str, f64)>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, fraction: f32) {
            self.progress
                .lock()
                .expect("progress mutex should lock")
                .push(fraction);
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record_scalar(&self, key: &'static str, value: f64) {
            self.scalars
                .lock()
                .expect("telemetry mutex should lock")
                .push((key, value));
        }
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = KernelPeltConfig::default();
        assert_eq!(config.penalty, 10.0);
        assert_eq!(config.gamma, None);
        assert_eq!(config.min_segment_len, 2);
        assert_eq!(config.jump, 5);

        for bad in [
            KernelPeltConfig {
                penalty: 0.0,
                ..KernelPeltConfig::default()
            },
            KernelPeltConfig {
                gamma: Some(-1.0),
                ..KernelPeltConfig::default()
            },
            KernelPeltConfig {
                jump: 0,
                ..KernelPeltConfig::default()
            },
            KernelPeltConfig {
                min_segment_len: 0,
                ..KernelPeltConfig::default()
            },
        ] {
            assert!(KernelPelt::new(bad).is_err());
        }
    }

    #[test]
    fn targets_respect_jump_and_min_segment_len() {
        assert_eq!(build_targets(23, 2, 5), vec![5, 10, 15, 20, 23]);
        assert_eq!(build_targets(12, 7, 3), vec![9, 12]);
        assert_eq!(build_targets(4, 1, 1), vec![1, 2, 3, 4]);
    }

    #[test]
    fn gamma_auto_uses_median_squared_distance() {
        // squared distances: 1, 4, 1 -> median 1
        assert_eq!(resolve_gamma(&[0.0, 1.0, 2.0]), 1.0);
        // squared distances: 1, 9, 16, 4, 9, 1 -> median (4 + 9) / 2
        assert_eq!(resolve_gamma(&[0.0, 1.0, 3.0, 4.0]), 1.0 / 6.5);
        assert_eq!(resolve_gamma(&[2.0; 6]), 1.0);
    }

    #[test]
    fn constant_series_has_no_change_points() {
        let detector =
            KernelPelt::new(KernelPeltConfig::default()).expect("config should be valid");
        let run = detector
            .detect(&[5.0; 200], &ExecutionContext::new())
            .expect("detection should succeed");
        assert!(run.detections.is_empty());
        assert!(run.completed);
    }

    #[test]
    fn single_mean_shift_is_found_on_jump_grid() {
        let values = step_signal(&[(100, 0.0), (100, 5.0)]);
        let detector =
            KernelPelt::new(KernelPeltConfig::default()).expect("config should be valid");
        let result = detector
            .segment(&values, &ExecutionContext::new())
            .expect("segmentation should succeed");
        assert_eq!(result.change_points, vec![100]);
        assert_eq!(result.breakpoints, vec![100, 200]);
        assert!(result.completed);
        assert_eq!(result.diagnostics.algorithm, "kernel-pelt");
        assert!(result
            .diagnostics
            .notes
            .iter()
            .any(|note| note.starts_with("kernel.rbf.gamma_auto=")));
    }

    #[test]
    fn two_level_changes_are_found() {
        let values = step_signal(&[(60, 0.0), (60, 4.0), (60, -3.0)]);
        let detector = KernelPelt::new(KernelPeltConfig {
            jump: 1,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let result = detector
            .segment(&values, &ExecutionContext::new())
            .expect("segmentation should succeed");
        assert_eq!(result.change_points, vec![60, 120]);
    }

    #[test]
    fn huge_penalty_suppresses_all_boundaries() {
        let values = step_signal(&[(50, 0.0), (50, 1.0)]);
        let detector = KernelPelt::new(KernelPeltConfig {
            penalty: 1.0e6,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let run = detector
            .detect(&values, &ExecutionContext::new())
            .expect("detection should succeed");
        assert!(run.detections.is_empty());
    }

    #[test]
    fn short_series_returns_empty_detections() {
        let detector =
            KernelPelt::new(KernelPeltConfig::default()).expect("config should be valid");
        let ctx = ExecutionContext::new();
        assert!(detector.detect(&[1.0, 9.0, 1.0], &ctx).expect("short ok").detections.is_empty());
        let result = detector.segment(&[], &ctx).expect("empty ok");
        assert!(result.breakpoints.is_empty());
    }

    #[test]
    fn cancellation_returns_partial_result() {
        let values = step_signal(&[(100, 0.0), (100, 5.0)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExecutionContext::new().with_cancel(&cancel);
        let detector = KernelPelt::new(KernelPeltConfig {
            cancel_check_every: 1,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let run = detector.detect(&values, &ctx).expect("cancel is not an error");
        assert!(!run.completed);
        assert!(run.detections.is_empty());
    }

    struct CancelAtProgress {
        cancel: CancelToken,
        at: f32,
    }

    impl ProgressSink for CancelAtProgress {
        fn on_progress(&self, fraction: f32) {
            if fraction >= self.at {
                self.cancel.cancel();
            }
        }
    }

    #[test]
    fn cancellation_mid_search_keeps_completed_prefix() {
        let values = step_signal(&[(100, 0.0), (100, 5.0), (100, -5.0)]);
        let cancel = CancelToken::new();
        let sink = CancelAtProgress {
            cancel: cancel.clone(),
            at: 0.5,
        };
        let ctx = ExecutionContext::new()
            .with_cancel(&cancel)
            .with_progress_sink(&sink);
        let detector = KernelPelt::new(KernelPeltConfig {
            cancel_check_every: 1,
            ..KernelPeltConfig::default()
        })
        .expect("config should be valid");
        let result = detector
            .segment(&values, &ctx)
            .expect("cancel is not an error");

        assert!(!result.completed);
        // 60 targets on the jump-5 grid; half of them end at sample 150
        assert_eq!(result.breakpoints, vec![100, 150]);
        assert_eq!(result.change_points, vec![100]);
        assert!(result
            .diagnostics
            .notes
            .iter()
            .any(|note| note == "cancelled after prefix [0, 150)"));
    }

    #[test]
    fn reports_progress_and_telemetry() {
        let sink = RecordingSink::default();
        let ctx = ExecutionContext::new()
            .with_progress_sink(&sink)
            .with_telemetry_sink(&sink);
        let values = step_signal(&[(40, 0.0), (40, 3.0)]);
        let detector =
            KernelPelt::new(KernelPeltConfig::default()).expect("config should be valid");
        let result = detector
            .segment(&values, &ctx)
            .expect("segmentation should succeed");

        let progress = sink.progress.lock().expect("progress should lock").clone();
        assert_eq!(progress.last().copied(), Some(1.0));
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));

        let scalars = sink.scalars.lock().expect("scalars should lock").clone();
        let keys: Vec<_> = scalars.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            vec![
                "changepoint.cost_evals",
                "changepoint.candidates_considered",
                "changepoint.candidates_pruned",
                "changepoint.runtime_ms",
            ]
        );
        let stats = result
            .diagnostics
            .pruning_stats
            .expect("pruning stats are recorded");
        assert!(stats.candidates_pruned > 0);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let detector =
            KernelPelt::new(KernelPeltConfig::default()).expect("config should be valid");
        let err = detector
            .detect(&[0.0, f64::NAN, 1.0, 2.0], &ExecutionContext::new())
            .expect_err("nan must fail");
        assert!(err.to_string().contains("KernelPelt requires finite values"));
    }
}
