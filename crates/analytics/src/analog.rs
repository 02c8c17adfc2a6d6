//! Historical analog matching with banded dynamic time warping.
//!
//! The most recent window is z-normalised and compared with every earlier
//! window of the same length that ends before the query window minus a
//! cool-down gap. Candidates are scanned most recent first and the scan stops
//! after `max_candidates`. Distances use a Sakoe-Chiba band. Flat windows
//! carry no shape: a flat query yields no matches and flat candidates are
//! skipped.

use disclosure_core::stats::{mean, std_dev, weighted_mean_std, z_normalize};
use disclosure_core::{AnalogConfig, AnalyticsError, AnalyticsResult};
use serde::{Deserialize, Serialize};

use crate::timeseries::EntityTimeSeries;

/// Steps after a match over which realized outcomes are measured.
pub const SHORT_OUTCOME_STEPS: usize = 30;
pub const LONG_OUTCOME_STEPS: usize = 90;

/// A past window resembling the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMatch {
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    /// 1 / (1 + distance), in (0, 1]
    pub similarity: f64,
    /// Mean banded DTW cost per step
    pub distance: f64,
    /// Mean activity over the next 30 steps minus the window mean
    pub outcome_30: Option<f64>,
    /// Mean activity over the next 90 steps minus the window mean
    pub outcome_90: Option<f64>,
}

impl HistoricalMatch {
    fn overlaps(&self, start: usize, window: usize) -> bool {
        self.start_index < start + window && start < self.start_index + window
    }
}

/// Similarity-weighted consensus over the retained matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogConsensus {
    pub expected_change_30: Option<f64>,
    pub expected_change_90: Option<f64>,
    /// Mean similarity x outcome agreement x sample factor
    pub confidence: f64,
    /// Matches contributing an outcome
    pub sample_size: usize,
    pub average_similarity: f64,
}

impl AnalogConsensus {
    /// Expected change at the outcome horizon closest to `horizon_days`.
    #[must_use]
    pub fn expected_change(&self, horizon_days: u32) -> Option<f64> {
        let prefer_long = horizon_days as usize > (SHORT_OUTCOME_STEPS + LONG_OUTCOME_STEPS) / 2;
        if prefer_long {
            self.expected_change_90.or(self.expected_change_30)
        } else {
            self.expected_change_30.or(self.expected_change_90)
        }
    }
}

/// Result of one analog search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogAnalysis {
    /// Sorted by similarity descending, non-overlapping
    pub matches: Vec<HistoricalMatch>,
    pub consensus: Option<AnalogConsensus>,
    pub candidates_scanned: usize,
    pub window_size: usize,
    /// Mean activity of the query window in original units
    pub query_mean: f64,
}

impl AnalogAnalysis {
    fn empty(window_size: usize, query_mean: f64) -> Self {
        Self {
            matches: Vec::new(),
            consensus: None,
            candidates_scanned: 0,
            window_size,
            query_mean,
        }
    }

    #[must_use]
    pub fn best(&self) -> Option<&HistoricalMatch> {
        self.matches.first()
    }
}

/// Banded-DTW analog matcher.
#[derive(Debug, Clone, Default)]
pub struct AnalogMatcher {
    config: AnalogConfig,
}

impl AnalogMatcher {
    #[must_use]
    pub fn new(config: AnalogConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AnalogConfig {
        &self.config
    }

    /// Searches with the configured window size and top-K.
    ///
    /// # Errors
    /// See [`AnalogMatcher::find_matches`].
    pub fn analyze(&self, series: &EntityTimeSeries) -> AnalyticsResult<AnalogAnalysis> {
        self.find_matches(series, self.config.window_size, self.config.top_k)
    }

    /// Finds up to `top_k` non-overlapping historical windows similar to the latest one.
    ///
    /// # Errors
    /// - `InvalidParameter` when `window_size < 2` or `top_k == 0`
    /// - `InsufficientData` when the series is shorter than twice the window
    /// - `ModelFit` when the series is constant
    pub fn find_matches(
        &self,
        series: &EntityTimeSeries,
        window_size: usize,
        top_k: usize,
    ) -> AnalyticsResult<AnalogAnalysis> {
        if window_size < 2 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "analog window must be at least 2, got {window_size}"
            )));
        }
        if top_k == 0 {
            return Err(AnalyticsError::InvalidParameter("top_k must be at least 1".to_string()));
        }

        let activity = series.activity();
        let n = activity.len();
        if n < 2 * window_size {
            return Err(AnalyticsError::insufficient("analog", 2 * window_size, n));
        }
        if activity.iter().all(|v| (v - activity[0]).abs() < 1e-12) {
            return Err(AnalyticsError::ModelFit(
                "constant activity series has no shape to match".to_string(),
            ));
        }

        let query_start = n - window_size;
        let query_mean = mean(&activity[query_start..]);
        if is_flat(&activity[query_start..]) {
            tracing::debug!(entity = %series.entity_id, "Flat query window, no analogs searched");
            return Ok(AnalogAnalysis::empty(window_size, query_mean));
        }
        let query = z_normalize(&activity[query_start..]);
        let radius = self
            .config
            .band_radius
            .unwrap_or_else(|| (window_size / 10).max(1));

        // Last admissible candidate start; windows must end a cool-down before the query.
        let Some(latest_start) = query_start.checked_sub(window_size + self.config.cooldown) else {
            tracing::debug!(entity = %series.entity_id, "No room for analog candidates");
            return Ok(AnalogAnalysis::empty(window_size, query_mean));
        };

        let mut scored: Vec<(usize, f64)> = Vec::new();
        let mut scanned = 0;
        for start in (0..=latest_start).rev() {
            if scanned >= self.config.max_candidates {
                break;
            }
            scanned += 1;
            let window = &activity[start..start + window_size];
            if is_flat(window) {
                continue;
            }
            let candidate = z_normalize(window);
            let distance = banded_dtw(&query, &candidate, radius) / window_size as f64;
            let similarity = 1.0 / (1.0 + distance);
            if similarity >= self.config.similarity_floor {
                scored.push((start, distance));
            }
        }

        // Most similar first; ties favour the more recent window.
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.cmp(&a.0))
        });

        let mut matches: Vec<HistoricalMatch> = Vec::new();
        for (start, distance) in scored {
            if matches.len() >= top_k {
                break;
            }
            if matches.iter().any(|m| m.overlaps(start, window_size)) {
                continue;
            }
            let end = start + window_size;
            let window_mean = mean(&activity[start..end]);
            let outcome = |steps: usize| {
                (end + steps <= n).then(|| mean(&activity[end..end + steps]) - window_mean)
            };
            matches.push(HistoricalMatch {
                start_index: start,
                end_index: end - 1,
                start_date: series.date_at(start),
                end_date: series.date_at(end - 1),
                similarity: 1.0 / (1.0 + distance),
                distance,
                outcome_30: outcome(SHORT_OUTCOME_STEPS),
                outcome_90: outcome(LONG_OUTCOME_STEPS),
            });
        }

        let consensus = build_consensus(&matches, mean(activity));
        tracing::debug!(
            entity = %series.entity_id,
            scanned,
            matches = matches.len(),
            "Analog search complete"
        );

        Ok(AnalogAnalysis {
            matches,
            consensus,
            candidates_scanned: scanned,
            window_size,
            query_mean,
        })
    }
}

fn build_consensus(matches: &[HistoricalMatch], activity_scale: f64) -> Option<AnalogConsensus> {
    let weighted = |pick: fn(&HistoricalMatch) -> Option<f64>| -> Option<(f64, f64, usize)> {
        let (values, weights): (Vec<f64>, Vec<f64>) = matches
            .iter()
            .filter_map(|m| pick(m).map(|v| (v, m.similarity)))
            .unzip();
        weighted_mean_std(&values, &weights).map(|(m, s)| (m, s, values.len()))
    };

    let short = weighted(|m| m.outcome_30);
    let long = weighted(|m| m.outcome_90);
    let (primary_mean, primary_std, sample_size) = short.or(long)?;

    let average_similarity = mean(&matches.iter().map(|m| m.similarity).collect::<Vec<_>>());
    let scale = primary_mean.abs().max(activity_scale).max(1e-9);
    let agreement = 1.0 - (primary_std / scale).min(1.0);
    let sample_factor = (sample_size as f64 / 5.0).sqrt().min(1.0);

    Some(AnalogConsensus {
        expected_change_30: short.map(|s| s.0),
        expected_change_90: long.map(|l| l.0),
        confidence: (average_similarity * agreement * sample_factor).clamp(0.0, 1.0),
        sample_size,
        average_similarity,
    })
}

fn is_flat(window: &[f64]) -> bool {
    std_dev(window) < 1e-12
}

/// DTW over absolute differences restricted to |i - j| <= radius.
fn banded_dtw(a: &[f64], b: &[f64], radius: usize) -> f64 {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }
    let radius = radius.max(n.abs_diff(m));
    let mut prev = vec![f64::INFINITY; m + 1];
    let mut curr = vec![f64::INFINITY; m + 1];
    prev[0] = 0.0;

    for i in 1..=n {
        curr.fill(f64::INFINITY);
        let lo = i.saturating_sub(radius).max(1);
        let hi = (i + radius).min(m);
        for j in lo..=hi {
            let cost = (a[i - 1] - b[j - 1]).abs();
            curr[j] = cost + prev[j - 1].min(prev[j]).min(curr[j - 1]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}
