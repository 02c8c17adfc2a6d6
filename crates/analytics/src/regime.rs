//! Latent activity regimes via a Gaussian hidden Markov model.
//!
//! Features per step are activity, log volume, rolling activity volatility,
//! and momentum, z-standardised before fitting. The model uses diagonal
//! covariances and is fitted with Baum-Welch using per-step scaling. States
//! are initialised deterministically from activity quantiles, so the same
//! series always yields the same fit.

use disclosure_core::stats::{mean, std_dev};
use disclosure_core::{AnalyticsError, AnalyticsResult, RegimeConfig};
use serde::{Deserialize, Serialize};

use crate::timeseries::EntityTimeSeries;

const N_FEATURES: usize = 4;
const VARIANCE_FLOOR: f64 = 1e-3;
const MAX_STAY_PROBABILITY: f64 = 0.999;
/// Mean activity below which the lowest state is reported as dormant.
const DORMANT_ACTIVITY: f64 = 0.05;

/// Post-hoc label of a regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLabel {
    Dormant,
    LowActivity,
    ModerateActivity,
    HighActivity,
    HighVolatility,
}

impl RegimeLabel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::LowActivity => "low activity",
            Self::ModerateActivity => "moderate activity",
            Self::HighActivity => "high activity",
            Self::HighVolatility => "high volatility",
        }
    }
}

/// Statistics of one latent regime, in original units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub index: usize,
    pub label: RegimeLabel,
    /// Posterior-weighted mean trades per bucket
    pub mean_activity: f64,
    /// Posterior-weighted standard deviation of trades per bucket
    pub volatility: f64,
    /// Posterior-weighted mean notional per bucket
    pub mean_volume: f64,
    /// Average run length in buckets along the decoded path
    pub average_duration: f64,
    /// Share of decoded steps spent in this state
    pub frequency: f64,
    /// Outgoing transition probabilities, indexed by target state
    pub transitions: Vec<f64>,
}

/// A contiguous run of one state along the decoded path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSpan {
    pub state: usize,
    pub label: RegimeLabel,
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

impl RegimeSpan {
    /// Buckets covered by the run.
    #[must_use]
    pub const fn duration(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Fitted regime model for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAnalysis {
    pub states: Vec<RegimeState>,
    pub current_state: usize,
    pub current_label: RegimeLabel,
    /// Posterior probability of the current state at the last step
    pub current_probability: f64,
    pub transition_matrix: Vec<Vec<f64>>,
    /// Decoded path compressed into runs, oldest first
    pub history: Vec<RegimeSpan>,
    /// Expected further buckets in the current regime, 1 / (1 - p_stay)
    pub expected_remaining_duration: f64,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Posterior state distribution at the last step
    pub final_distribution: Vec<f64>,
}

impl RegimeAnalysis {
    #[must_use]
    pub fn current(&self) -> Option<&RegimeState> {
        self.states.get(self.current_state)
    }

    /// Self-transition probability of the current state.
    #[must_use]
    pub fn stay_probability(&self) -> f64 {
        self.transition_matrix
            .get(self.current_state)
            .and_then(|row| row.get(self.current_state))
            .copied()
            .unwrap_or(0.0)
    }

    /// Probability of leaving the current regime within `horizon` steps.
    #[must_use]
    pub fn leave_probability(&self, horizon: u32) -> f64 {
        let stay = self.stay_probability().clamp(0.0, 1.0);
        (1.0 - stay.powi(horizon.min(i32::MAX as u32) as i32)).clamp(0.0, 1.0)
    }

    /// Expected mean activity over the next `horizon` steps.
    ///
    /// Propagates the final posterior through the transition matrix.
    #[must_use]
    pub fn expected_activity(&self, horizon: u32) -> f64 {
        let k = self.states.len();
        if k == 0 || horizon == 0 {
            return 0.0;
        }
        let mut dist = self.final_distribution.clone();
        let mut total = 0.0;
        for _ in 0..horizon {
            let mut next = vec![0.0; k];
            for (i, p) in dist.iter().enumerate() {
                for (j, slot) in next.iter_mut().enumerate() {
                    *slot += p * self.transition_matrix[i][j];
                }
            }
            dist = next;
            total += dist
                .iter()
                .zip(&self.states)
                .map(|(p, s)| p * s.mean_activity)
                .sum::<f64>();
        }
        total / f64::from(horizon)
    }

    /// Number of regime switches along the decoded path.
    #[must_use]
    pub fn transitions_observed(&self) -> usize {
        self.history.len().saturating_sub(1)
    }
}

/// Gaussian HMM regime detector.
#[derive(Debug, Clone, Default)]
pub struct RegimeDetector {
    config: RegimeConfig,
}

impl RegimeDetector {
    #[must_use]
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    #[must_use]
    pub fn min_length(&self) -> usize {
        self.config.n_states * 10
    }

    /// Fits the model and decodes the regime history.
    ///
    /// # Errors
    /// - `InvalidParameter` for fewer than 2 states
    /// - `InsufficientData` for fewer than `n_states * 10` observations
    /// - `ModelFit` for a constant series or a non-finite likelihood
    pub fn detect(&self, series: &EntityTimeSeries) -> AnalyticsResult<RegimeAnalysis> {
        let k = self.config.n_states;
        if k < 2 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "regime model needs at least 2 states, got {k}"
            )));
        }
        let n = series.len();
        if n < self.min_length() {
            return Err(AnalyticsError::insufficient("regime", self.min_length(), n));
        }

        let activity = series.activity();
        if activity.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::ModelFit("non-finite activity value".to_string()));
        }
        if std_dev(activity) < 1e-12 {
            return Err(AnalyticsError::ModelFit("constant activity series".to_string()));
        }

        let raw = extract_features(series, self.config.feature_window.max(1));
        let observations = standardize(&raw);

        let mut model = GaussianHmm::initialize(&observations, k);
        let mut previous = f64::NEG_INFINITY;
        let mut log_likelihood = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut converged = false;
        let mut posteriors = Vec::new();

        while iterations < self.config.max_iterations.max(1) {
            iterations += 1;
            let pass = model.forward_backward(&observations);
            if !pass.log_likelihood.is_finite() {
                return Err(AnalyticsError::ModelFit(format!(
                    "non-finite log-likelihood at iteration {iterations}"
                )));
            }
            log_likelihood = pass.log_likelihood;
            model.reestimate(&observations, &pass);
            posteriors = pass.gamma;

            if (log_likelihood - previous).abs() < self.config.tolerance * (1.0 + previous.abs()) {
                converged = true;
                break;
            }
            previous = log_likelihood;
        }

        // Final posteriors under the re-estimated parameters
        let pass = model.forward_backward(&observations);
        if pass.log_likelihood.is_finite() {
            log_likelihood = pass.log_likelihood;
            posteriors = pass.gamma;
        }

        let path = model.viterbi(&observations);
        let Some(&current_state) = path.last() else {
            return Err(AnalyticsError::ModelFit("empty decoded path".to_string()));
        };

        let states = summarize_states(series, &model, &posteriors, &path);
        let spans = compress_path(series, &path, &states);
        let final_distribution = posteriors.last().cloned().unwrap_or_else(|| vec![1.0 / k as f64; k]);
        let current_probability = final_distribution.get(current_state).copied().unwrap_or(0.0);
        let p_stay = model.transitions[current_state][current_state].min(MAX_STAY_PROBABILITY);

        tracing::debug!(
            entity = %series.entity_id,
            iterations,
            converged,
            log_likelihood,
            current = states[current_state].label.as_str(),
            "Regime model fitted"
        );

        Ok(RegimeAnalysis {
            current_label: states[current_state].label,
            states,
            current_state,
            current_probability: current_probability.clamp(0.0, 1.0),
            transition_matrix: model.transitions,
            history: spans,
            expected_remaining_duration: 1.0 / (1.0 - p_stay),
            log_likelihood,
            iterations,
            converged,
            final_distribution,
        })
    }
}

/// Activity, log volume, rolling volatility, and momentum per step.
fn extract_features(series: &EntityTimeSeries, window: usize) -> Vec<[f64; N_FEATURES]> {
    let activity = series.activity();
    (0..series.len())
        .map(|t| {
            let start = (t + 1).saturating_sub(window);
            let volatility = std_dev(&activity[start..=t]);
            let momentum = if t >= window {
                activity[t] - activity[t - window]
            } else {
                0.0
            };
            [
                activity[t],
                series.notional[t].max(0.0).ln_1p(),
                volatility,
                momentum,
            ]
        })
        .collect()
}

fn standardize(raw: &[[f64; N_FEATURES]]) -> Vec<[f64; N_FEATURES]> {
    let mut out = raw.to_vec();
    for d in 0..N_FEATURES {
        let column: Vec<f64> = raw.iter().map(|row| row[d]).collect();
        let m = mean(&column);
        let sd = std_dev(&column);
        for row in &mut out {
            row[d] = if sd > 1e-12 { (row[d] - m) / sd } else { 0.0 };
        }
    }
    out
}

struct ForwardBackward {
    gamma: Vec<Vec<f64>>,
    /// Expected transition counts summed over time
    xi_sum: Vec<Vec<f64>>,
    log_likelihood: f64,
}

struct GaussianHmm {
    initial: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    means: Vec<[f64; N_FEATURES]>,
    variances: Vec<[f64; N_FEATURES]>,
}

impl GaussianHmm {
    /// Splits observations into `k` activity quantiles (ties broken by volatility).
    fn initialize(observations: &[[f64; N_FEATURES]], k: usize) -> Self {
        let mut order: Vec<usize> = (0..observations.len()).collect();
        order.sort_by(|&a, &b| {
            let (oa, ob) = (&observations[a], &observations[b]);
            oa[0]
                .partial_cmp(&ob[0])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(oa[2].partial_cmp(&ob[2]).unwrap_or(std::cmp::Ordering::Equal))
        });

        let chunk = order.len() / k;
        let mut means = Vec::with_capacity(k);
        let mut variances = Vec::with_capacity(k);
        for s in 0..k {
            let end = if s + 1 == k { order.len() } else { (s + 1) * chunk };
            let members = &order[s * chunk..end];
            let mut mu = [0.0; N_FEATURES];
            let mut var = [0.0; N_FEATURES];
            for d in 0..N_FEATURES {
                let column: Vec<f64> = members.iter().map(|&i| observations[i][d]).collect();
                mu[d] = mean(&column);
                var[d] = std_dev(&column).powi(2).max(VARIANCE_FLOOR);
            }
            means.push(mu);
            variances.push(var);
        }

        let off = 0.1 / (k - 1) as f64;
        let transitions = (0..k)
            .map(|i| (0..k).map(|j| if i == j { 0.9 } else { off }).collect())
            .collect();

        Self {
            initial: vec![1.0 / k as f64; k],
            transitions,
            means,
            variances,
        }
    }

    fn n_states(&self) -> usize {
        self.initial.len()
    }

    fn log_emission(&self, x: &[f64; N_FEATURES], state: usize) -> f64 {
        let mu = &self.means[state];
        let var = &self.variances[state];
        (0..N_FEATURES)
            .map(|d| {
                let diff = x[d] - mu[d];
                -0.5 * ((2.0 * std::f64::consts::PI * var[d]).ln() + diff * diff / var[d])
            })
            .sum()
    }

    /// Emission likelihoods scaled per step by the row maximum; returns the log offsets too.
    fn scaled_emissions(&self, observations: &[[f64; N_FEATURES]]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let k = self.n_states();
        let mut emissions = Vec::with_capacity(observations.len());
        let mut offsets = Vec::with_capacity(observations.len());
        for x in observations {
            let logs: Vec<f64> = (0..k).map(|s| self.log_emission(x, s)).collect();
            let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            emissions.push(logs.iter().map(|l| (l - max).exp()).collect());
            offsets.push(max);
        }
        (emissions, offsets)
    }

    fn forward_backward(&self, observations: &[[f64; N_FEATURES]]) -> ForwardBackward {
        let k = self.n_states();
        let n = observations.len();
        let (b, offsets) = self.scaled_emissions(observations);

        let mut alpha = vec![vec![0.0; k]; n];
        let mut scale = vec![0.0; n];
        let mut log_likelihood = 0.0;

        for t in 0..n {
            for j in 0..k {
                let prior = if t == 0 {
                    self.initial[j]
                } else {
                    (0..k).map(|i| alpha[t - 1][i] * self.transitions[i][j]).sum()
                };
                alpha[t][j] = prior * b[t][j];
            }
            let c: f64 = alpha[t].iter().sum();
            if c <= 0.0 || !c.is_finite() {
                return ForwardBackward {
                    gamma: Vec::new(),
                    xi_sum: Vec::new(),
                    log_likelihood: f64::NAN,
                };
            }
            for a in &mut alpha[t] {
                *a /= c;
            }
            scale[t] = c;
            log_likelihood += c.ln() + offsets[t];
        }

        let mut beta = vec![vec![1.0; k]; n];
        for t in (0..n.saturating_sub(1)).rev() {
            for i in 0..k {
                beta[t][i] = (0..k)
                    .map(|j| self.transitions[i][j] * b[t + 1][j] * beta[t + 1][j])
                    .sum::<f64>()
                    / scale[t + 1];
            }
        }

        let gamma: Vec<Vec<f64>> = (0..n)
            .map(|t| {
                let raw: Vec<f64> = (0..k).map(|i| alpha[t][i] * beta[t][i]).collect();
                let total: f64 = raw.iter().sum();
                if total > 0.0 {
                    raw.iter().map(|g| g / total).collect()
                } else {
                    vec![1.0 / k as f64; k]
                }
            })
            .collect();

        let mut xi_sum = vec![vec![0.0; k]; k];
        for t in 0..n.saturating_sub(1) {
            let mut step = vec![vec![0.0; k]; k];
            let mut total = 0.0;
            for i in 0..k {
                for j in 0..k {
                    let v = alpha[t][i] * self.transitions[i][j] * b[t + 1][j] * beta[t + 1][j];
                    step[i][j] = v;
                    total += v;
                }
            }
            if total > 0.0 {
                for i in 0..k {
                    for j in 0..k {
                        xi_sum[i][j] += step[i][j] / total;
                    }
                }
            }
        }

        ForwardBackward {
            gamma,
            xi_sum,
            log_likelihood,
        }
    }

    fn reestimate(&mut self, observations: &[[f64; N_FEATURES]], pass: &ForwardBackward) {
        let k = self.n_states();
        let n = observations.len();
        if pass.gamma.len() != n || n == 0 {
            return;
        }

        self.initial = pass.gamma[0].clone();

        for i in 0..k {
            let row_total: f64 = pass.xi_sum[i].iter().sum();
            if row_total > 1e-12 {
                let smoothed: Vec<f64> = pass.xi_sum[i].iter().map(|x| x / row_total + 1e-6).collect();
                let norm: f64 = smoothed.iter().sum();
                self.transitions[i] = smoothed.iter().map(|x| x / norm).collect();
            }
        }

        for s in 0..k {
            let weight: f64 = pass.gamma.iter().map(|g| g[s]).sum();
            if weight < 1e-9 {
                continue;
            }
            let mut mu = [0.0; N_FEATURES];
            for (x, g) in observations.iter().zip(&pass.gamma) {
                for d in 0..N_FEATURES {
                    mu[d] += g[s] * x[d];
                }
            }
            for m in &mut mu {
                *m /= weight;
            }
            let mut var = [0.0; N_FEATURES];
            for (x, g) in observations.iter().zip(&pass.gamma) {
                for d in 0..N_FEATURES {
                    var[d] += g[s] * (x[d] - mu[d]).powi(2);
                }
            }
            for v in &mut var {
                *v = (*v / weight).max(VARIANCE_FLOOR);
            }
            self.means[s] = mu;
            self.variances[s] = var;
        }
    }

    fn viterbi(&self, observations: &[[f64; N_FEATURES]]) -> Vec<usize> {
        let k = self.n_states();
        let n = observations.len();
        if n == 0 {
            return Vec::new();
        }
        let ln = |p: f64| p.max(1e-300).ln();

        let mut delta: Vec<f64> = (0..k)
            .map(|s| ln(self.initial[s]) + self.log_emission(&observations[0], s))
            .collect();
        let mut backpointers = vec![vec![0usize; k]; n];

        for t in 1..n {
            let mut next = vec![f64::NEG_INFINITY; k];
            for j in 0..k {
                let (best_i, best) = (0..k)
                    .map(|i| (i, delta[i] + ln(self.transitions[i][j])))
                    .fold((0, f64::NEG_INFINITY), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
                next[j] = best + self.log_emission(&observations[t], j);
                backpointers[t][j] = best_i;
            }
            delta = next;
        }

        let mut state = (0..k)
            .fold((0, f64::NEG_INFINITY), |acc, s| if delta[s] > acc.1 { (s, delta[s]) } else { acc })
            .0;
        let mut path = vec![0; n];
        for t in (0..n).rev() {
            path[t] = state;
            state = backpointers[t][state];
        }
        path
    }
}

fn summarize_states(
    series: &EntityTimeSeries,
    model: &GaussianHmm,
    posteriors: &[Vec<f64>],
    path: &[usize],
) -> Vec<RegimeState> {
    let k = model.n_states();
    let n = path.len();
    let activity = series.activity();

    let mut runs: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut run_start = 0;
    for t in 1..=n {
        if t == n || path[t] != path[run_start] {
            runs[path[run_start]].push(t - run_start);
            run_start = t;
        }
    }

    let mut states: Vec<RegimeState> = (0..k)
        .map(|s| {
            let weights: Vec<f64> = if posteriors.len() == n {
                posteriors.iter().map(|g| g[s]).collect()
            } else {
                path.iter().map(|&p| if p == s { 1.0 } else { 0.0 }).collect()
            };
            let total: f64 = weights.iter().sum();
            let (mean_activity, volatility, mean_volume) = if total > 1e-12 {
                let m = activity.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>() / total;
                let var = activity
                    .iter()
                    .zip(&weights)
                    .map(|(a, w)| w * (a - m).powi(2))
                    .sum::<f64>()
                    / total;
                let vol = series.notional.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>() / total;
                (m, var.max(0.0).sqrt(), vol)
            } else {
                (0.0, 0.0, 0.0)
            };

            let visits = path.iter().filter(|&&p| p == s).count();
            let p_stay = model.transitions[s][s].min(MAX_STAY_PROBABILITY);
            let average_duration = if runs[s].is_empty() {
                1.0 / (1.0 - p_stay)
            } else {
                runs[s].iter().sum::<usize>() as f64 / runs[s].len() as f64
            };

            RegimeState {
                index: s,
                label: RegimeLabel::ModerateActivity,
                mean_activity,
                volatility,
                mean_volume,
                average_duration,
                frequency: visits as f64 / n.max(1) as f64,
                transitions: model.transitions[s].clone(),
            }
        })
        .collect();

    assign_labels(&mut states);
    states
}

/// Ranks states by mean activity and volatility to assign labels.
fn assign_labels(states: &mut [RegimeState]) {
    let mut by_mean: Vec<usize> = (0..states.len()).collect();
    by_mean.sort_by(|&a, &b| {
        states[a]
            .mean_activity
            .partial_cmp(&states[b].mean_activity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let (Some(&lowest), Some(&highest)) = (by_mean.first(), by_mean.last()) else {
        return;
    };

    for state in states.iter_mut() {
        state.label = RegimeLabel::ModerateActivity;
    }
    states[lowest].label = if states[lowest].mean_activity < DORMANT_ACTIVITY {
        RegimeLabel::Dormant
    } else {
        RegimeLabel::LowActivity
    };
    if highest != lowest {
        states[highest].label = RegimeLabel::HighActivity;
    }

    let middle = &by_mean[1..by_mean.len().saturating_sub(1).max(1)];
    if let Some(&volatile) = middle.iter().max_by(|&&a, &&b| {
        states[a]
            .volatility
            .partial_cmp(&states[b].volatility)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        states[volatile].label = RegimeLabel::HighVolatility;
    }
}

fn compress_path(series: &EntityTimeSeries, path: &[usize], states: &[RegimeState]) -> Vec<RegimeSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    for t in 1..=path.len() {
        if t == path.len() || path[t] != path[start] {
            let state = path[start];
            spans.push(RegimeSpan {
                state,
                label: states[state].label,
                start_index: start,
                end_index: t - 1,
                start_date: series.date_at(start),
                end_date: series.date_at(t - 1),
            });
            start = t;
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
    }

    /// Quiet first half, busy second half.
    fn two_regime_series(seed: u64) -> EntityTimeSeries {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let activity: Vec<f64> = (0..400)
            .map(|t| {
                if t < 200 {
                    if rng.gen_bool(0.1) {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    f64::from(rng.gen_range(3..=7))
                }
            })
            .collect();
        EntityTimeSeries::from_activity("P1", start(), activity)
    }

    fn two_state_detector() -> RegimeDetector {
        RegimeDetector::new(RegimeConfig {
            n_states: 2,
            ..RegimeConfig::default()
        })
    }

    // ============================================
    // Fit Tests
    // ============================================

    #[test]
    fn detects_shift_into_high_activity() {
        let analysis = two_state_detector().detect(&two_regime_series(1)).unwrap();

        assert_eq!(analysis.current_label, RegimeLabel::HighActivity);
        let current = analysis.current().unwrap();
        assert!(current.mean_activity > 3.0, "mean was {}", current.mean_activity);
        assert!(analysis.history.len() >= 2);
        assert_eq!(analysis.history.last().unwrap().end_index, 399);
    }

    #[test]
    fn default_four_states_keep_busy_regime_current() {
        let analysis = RegimeDetector::default().detect(&two_regime_series(2)).unwrap();

        assert_eq!(analysis.states.len(), 4);
        assert!(analysis.current().unwrap().mean_activity > 2.0);
        let labels: Vec<RegimeLabel> = analysis.states.iter().map(|s| s.label).collect();
        assert!(labels.contains(&RegimeLabel::HighActivity));
        assert!(labels.contains(&RegimeLabel::HighVolatility));
    }

    #[test]
    fn transition_rows_are_distributions() {
        let analysis = RegimeDetector::default().detect(&two_regime_series(3)).unwrap();

        for row in &analysis.transition_matrix {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-6);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
        assert!((0.0..=1.0).contains(&analysis.current_probability));
        let freq: f64 = analysis.states.iter().map(|s| s.frequency).sum();
        assert!((freq - 1.0).abs() < 1e-9);
    }

    #[test]
    fn history_spans_cover_the_series() {
        let series = two_regime_series(4);
        let analysis = two_state_detector().detect(&series).unwrap();

        let covered: usize = analysis.history.iter().map(RegimeSpan::duration).sum();
        assert_eq!(covered, series.len());
        assert_eq!(analysis.history[0].start_date, Some(start()));
        assert_eq!(analysis.transitions_observed(), analysis.history.len() - 1);
    }

    #[test]
    fn fit_is_deterministic() {
        let series = two_regime_series(5);
        let a = RegimeDetector::default().detect(&series).unwrap();
        let b = RegimeDetector::default().detect(&series).unwrap();
        assert_eq!(a, b);
    }

    // ============================================
    // Failure Tests
    // ============================================

    #[test]
    fn short_series_is_insufficient() {
        let series = EntityTimeSeries::from_activity("P1", start(), vec![1.0, 0.0, 2.0]);
        let err = RegimeDetector::default().detect(&series).unwrap_err();
        assert_eq!(err, AnalyticsError::insufficient("regime", 40, 3));
    }

    #[test]
    fn constant_series_fails_to_fit() {
        let series = EntityTimeSeries::from_activity("P1", start(), vec![2.0; 100]);
        let err = RegimeDetector::default().detect(&series).unwrap_err();
        assert!(matches!(err, AnalyticsError::ModelFit(_)));
    }

    #[test]
    fn single_state_is_invalid() {
        let detector = RegimeDetector::new(RegimeConfig {
            n_states: 1,
            ..RegimeConfig::default()
        });
        assert!(matches!(
            detector.detect(&two_regime_series(6)),
            Err(AnalyticsError::InvalidParameter(_))
        ));
    }

    // ============================================
    // Derived Quantity Tests
    // ============================================

    #[test]
    fn leave_probability_and_remaining_duration() {
        let analysis = two_state_detector().detect(&two_regime_series(7)).unwrap();
        let stay = analysis.stay_probability();

        assert!((analysis.leave_probability(1) - (1.0 - stay)).abs() < 1e-12);
        assert!(analysis.leave_probability(30) >= analysis.leave_probability(1));
        assert!(analysis.expected_remaining_duration >= 1.0);
    }

    #[test]
    fn expected_activity_tracks_current_regime() {
        let analysis = two_state_detector().detect(&two_regime_series(8)).unwrap();
        let expected = analysis.expected_activity(10);
        assert!(expected > 2.0, "expected activity was {expected}");
        assert_eq!(analysis.expected_activity(0), 0.0);
    }

    #[test]
    fn labels_rank_by_mean_and_volatility() {
        let make = |mean_activity: f64, volatility: f64| RegimeState {
            index: 0,
            label: RegimeLabel::ModerateActivity,
            mean_activity,
            volatility,
            mean_volume: 0.0,
            average_duration: 1.0,
            frequency: 0.25,
            transitions: Vec::new(),
        };
        let mut states = vec![make(2.0, 0.5), make(0.0, 0.0), make(1.5, 3.0), make(6.0, 1.0)];
        assign_labels(&mut states);

        assert_eq!(states[0].label, RegimeLabel::ModerateActivity);
        assert_eq!(states[1].label, RegimeLabel::Dormant);
        assert_eq!(states[2].label, RegimeLabel::HighVolatility);
        assert_eq!(states[3].label, RegimeLabel::HighActivity);
    }
}
