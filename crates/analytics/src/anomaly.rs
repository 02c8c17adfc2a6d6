//! Composite anomaly scoring.
//!
//! Three factors feed the score: how far recent activity deviates from the
//! preceding baseline, how strongly the ensemble's models disagree, and how
//! much of the recent activity falls on days without historical precedent.
//! Factors that cannot be computed are reported as unavailable and the
//! remaining weights are renormalised.

use chrono::Datelike;
use disclosure_core::stats::{mean, std_dev, z_to_unit_score};
use disclosure_core::AnomalyConfig;
use serde::{Deserialize, Serialize};

use crate::ensemble::EnsemblePrediction;
use crate::timeseries::EntityTimeSeries;

const DAYS_PER_YEAR: usize = 365;
const ANNIVERSARY_TOLERANCE_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalyLevel {
    /// Maps a score to a level; exactly 0.8 is still high.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFactorKind {
    StatisticalDeviation,
    ModelDisagreement,
    TimingIrregularity,
}

impl AnomalyFactorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatisticalDeviation => "statistical deviation",
            Self::ModelDisagreement => "model disagreement",
            Self::TimingIrregularity => "timing irregularity",
        }
    }
}

/// One contributing factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFactor {
    pub kind: AnomalyFactorKind,
    /// Factor score in [0, 1]; 0 when unavailable
    pub score: f64,
    /// Effective weight after renormalisation; 0 when unavailable
    pub weight: f64,
    pub available: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub entity_id: String,
    pub score: f64,
    pub level: AnomalyLevel,
    pub factors: Vec<AnomalyFactor>,
}

impl AnomalyReport {
    #[must_use]
    pub fn factor(&self, kind: AnomalyFactorKind) -> Option<&AnomalyFactor> {
        self.factors.iter().find(|f| f.kind == kind)
    }

    /// The available factor with the highest weighted contribution.
    #[must_use]
    pub fn dominant_factor(&self) -> Option<&AnomalyFactor> {
        self.factors
            .iter()
            .filter(|f| f.available)
            .max_by(|a, b| {
                (a.score * a.weight)
                    .partial_cmp(&(b.score * b.weight))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

struct FactorScore {
    kind: AnomalyFactorKind,
    configured_weight: f64,
    result: Result<(f64, String), String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyScorer {
    config: AnomalyConfig,
}

impl AnomalyScorer {
    #[must_use]
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Scores how unusual the entity's recent behaviour is.
    #[must_use]
    pub fn score(&self, series: &EntityTimeSeries, prediction: &EnsemblePrediction) -> AnomalyReport {
        let factors = [
            FactorScore {
                kind: AnomalyFactorKind::StatisticalDeviation,
                configured_weight: self.config.deviation_weight,
                result: self.deviation(series),
            },
            FactorScore {
                kind: AnomalyFactorKind::ModelDisagreement,
                configured_weight: self.config.disagreement_weight,
                result: disagreement(prediction),
            },
            FactorScore {
                kind: AnomalyFactorKind::TimingIrregularity,
                configured_weight: self.config.timing_weight,
                result: self.timing(series),
            },
        ];

        let available_weight: f64 = factors
            .iter()
            .filter(|f| f.result.is_ok())
            .map(|f| f.configured_weight.max(0.0))
            .sum();

        let factors: Vec<AnomalyFactor> = factors
            .into_iter()
            .map(|f| match f.result {
                Ok((score, detail)) => AnomalyFactor {
                    kind: f.kind,
                    score: score.clamp(0.0, 1.0),
                    weight: if available_weight > 0.0 {
                        f.configured_weight.max(0.0) / available_weight
                    } else {
                        0.0
                    },
                    available: true,
                    detail,
                },
                Err(reason) => AnomalyFactor {
                    kind: f.kind,
                    score: 0.0,
                    weight: 0.0,
                    available: false,
                    detail: reason,
                },
            })
            .collect();

        let score = factors
            .iter()
            .map(|f| f.score * f.weight)
            .sum::<f64>()
            .clamp(0.0, 1.0);
        let level = AnomalyLevel::from_score(score);

        tracing::debug!(
            entity = %series.entity_id,
            score,
            level = level.as_str(),
            "Anomaly score computed"
        );

        AnomalyReport {
            entity_id: series.entity_id.clone(),
            score,
            level,
            factors,
        }
    }

    fn windows<'a>(&self, series: &'a EntityTimeSeries) -> Option<(&'a [f64], &'a [f64])> {
        let activity = series.activity();
        let bucket = series.bucket_days.max(1) as usize;
        let recent = (self.config.recent_days / bucket).max(1);
        let baseline = (self.config.baseline_days / bucket).max(2);
        if activity.len() < recent + 2 {
            return None;
        }
        let split = activity.len() - recent;
        let base_start = split.saturating_sub(baseline);
        Some((&activity[base_start..split], &activity[split..]))
    }

    fn deviation(&self, series: &EntityTimeSeries) -> Result<(f64, String), String> {
        let Some((baseline, recent)) = self.windows(series) else {
            return Err(format!(
                "need more than {} days of history for a baseline",
                self.config.recent_days
            ));
        };
        let base_mean = mean(baseline);
        let base_sd = std_dev(baseline);
        let recent_mean = mean(recent);

        let z = if base_sd > 1e-12 {
            (recent_mean - base_mean) / base_sd
        } else if (recent_mean - base_mean).abs() < 1e-12 {
            0.0
        } else {
            f64::INFINITY
        };
        Ok((
            z_to_unit_score(z),
            format!(
                "recent mean {recent_mean:.2}/day vs baseline {base_mean:.2} (sd {base_sd:.2}), z = {z:.2}"
            ),
        ))
    }

    fn timing(&self, series: &EntityTimeSeries) -> Result<(f64, String), String> {
        let activity = series.activity();
        let bucket = series.bucket_days.max(1) as usize;
        let recent = (self.config.recent_days / bucket).max(1);
        if activity.len() <= recent {
            return Err("no history before the recent window".to_string());
        }
        let split = activity.len() - recent;
        let history_active: Vec<usize> = (0..split).filter(|&i| activity[i] > 0.0).collect();
        if history_active.is_empty() {
            return Err("no historical activity to compare timing against".to_string());
        }

        let recent_active: Vec<usize> = (split..activity.len()).filter(|&i| activity[i] > 0.0).collect();
        if recent_active.is_empty() {
            return Ok((0.0, "no recent activity".to_string()));
        }

        let used_weekdays: Vec<u32> = if bucket == 1 {
            history_active
                .iter()
                .filter_map(|&i| series.date_at(i))
                .map(|d| d.weekday().num_days_from_monday())
                .collect()
        } else {
            Vec::new()
        };

        let year = DAYS_PER_YEAR / bucket;
        let tolerance = ANNIVERSARY_TOLERANCE_DAYS / bucket;
        let has_full_year = split >= year && year > 0;

        let unprecedented = recent_active
            .iter()
            .filter(|&&i| {
                let weekday_unused = bucket == 1
                    && series
                        .date_at(i)
                        .map(|d| d.weekday().num_days_from_monday())
                        .is_some_and(|w| !used_weekdays.contains(&w));
                let no_anniversary = has_full_year
                    && !(1..=i / year.max(1)).any(|k| {
                        let centre = i - k * year;
                        let lo = centre.saturating_sub(tolerance);
                        let hi = (centre + tolerance).min(split.saturating_sub(1));
                        lo <= hi && (lo..=hi).any(|j| activity[j] > 0.0)
                    });
                weekday_unused || no_anniversary
            })
            .count();

        let share = unprecedented as f64 / recent_active.len() as f64;
        Ok((
            share,
            format!(
                "{unprecedented} of {} recent active days lack historical precedent",
                recent_active.len()
            ),
        ))
    }
}

fn disagreement(prediction: &EnsemblePrediction) -> Result<(f64, String), String> {
    if prediction.is_insufficient() {
        return Err("ensemble prediction has insufficient data".to_string());
    }
    Ok((
        1.0 - prediction.model_agreement.clamp(0.0, 1.0),
        format!(
            "model agreement {:.2} across {} model(s)",
            prediction.model_agreement,
            prediction.models_used()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{EnsembleCombiner, ModelOutputs, PredictionType};
    use chrono::NaiveDate;

    fn series_from(start: NaiveDate, values: Vec<f64>) -> EntityTimeSeries {
        EntityTimeSeries::from_activity("P1", start, values)
    }

    fn monday() -> NaiveDate {
        // 2024-01-01 is a Monday
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn insufficient_prediction() -> EnsemblePrediction {
        EnsembleCombiner::default()
            .combine(&series_from(monday(), vec![0.0; 10]), &ModelOutputs::unavailable("none"), 30)
            .unwrap()
    }

    fn prediction_with_agreement(agreement: f64) -> EnsemblePrediction {
        EnsemblePrediction {
            prediction_type: PredictionType::Stable,
            model_agreement: agreement,
            ..insufficient_prediction()
        }
    }

    // ============================================
    // Level Tests
    // ============================================

    #[test]
    fn level_boundaries() {
        assert_eq!(AnomalyLevel::from_score(0.0), AnomalyLevel::Low);
        assert_eq!(AnomalyLevel::from_score(0.39), AnomalyLevel::Low);
        assert_eq!(AnomalyLevel::from_score(0.4), AnomalyLevel::Medium);
        assert_eq!(AnomalyLevel::from_score(0.6), AnomalyLevel::High);
        assert_eq!(AnomalyLevel::from_score(0.8), AnomalyLevel::High);
        assert_eq!(AnomalyLevel::from_score(0.81), AnomalyLevel::Critical);
        assert!(AnomalyLevel::Critical > AnomalyLevel::High);
    }

    // ============================================
    // Factor Tests
    // ============================================

    #[test]
    fn surge_scores_high_deviation() {
        let mut values: Vec<f64> = (0..180).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }).collect();
        values.extend(std::iter::repeat(5.0).take(30));
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());

        let deviation = report.factor(AnomalyFactorKind::StatisticalDeviation).unwrap();
        assert!(deviation.available);
        assert!(deviation.score > 0.99);
    }

    #[test]
    fn steady_activity_scores_low_deviation() {
        let values: Vec<f64> = (0..210).map(|i| f64::from(i % 3)).collect();
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());
        let deviation = report.factor(AnomalyFactorKind::StatisticalDeviation).unwrap();
        assert!(deviation.score < 0.2);
    }

    #[test]
    fn insufficient_prediction_drops_disagreement_and_renormalises() {
        let values: Vec<f64> = (0..210).map(|i| f64::from(i % 3)).collect();
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());

        let disagreement = report.factor(AnomalyFactorKind::ModelDisagreement).unwrap();
        assert!(!disagreement.available);
        assert_eq!(disagreement.weight, 0.0);
        let total: f64 = report.factors.iter().map(|f| f.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disagreement_is_one_minus_agreement() {
        let values: Vec<f64> = (0..210).map(|i| f64::from(i % 3)).collect();
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &prediction_with_agreement(0.25));
        let factor = report.factor(AnomalyFactorKind::ModelDisagreement).unwrap();
        assert!((factor.score - 0.75).abs() < 1e-12);
        assert!((factor.weight - 0.3).abs() < 1e-12);
    }

    #[test]
    fn weekend_trading_lacks_precedent() {
        // Weekday-only history, then recent trades only on Saturdays
        let mut values: Vec<f64> = (0..180).map(|i| if i % 7 < 5 { 1.0 } else { 0.0 }).collect();
        values.extend((180..210).map(|i| if i % 7 == 5 { 1.0 } else { 0.0 }));
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());

        let timing = report.factor(AnomalyFactorKind::TimingIrregularity).unwrap();
        assert!(timing.available);
        assert!((timing.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn familiar_weekdays_have_precedent() {
        let values: Vec<f64> = (0..210).map(|i| if i % 7 < 5 { 1.0 } else { 0.0 }).collect();
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());
        let timing = report.factor(AnomalyFactorKind::TimingIrregularity).unwrap();
        assert_eq!(timing.score, 0.0);
    }

    #[test]
    fn anniversary_check_applies_after_a_year() {
        // Monday trades around midsummer in both years, then one in late December
        let mut values = vec![0.0; 730];
        for year in 0..2 {
            for week in 0..3 {
                values[182 + year * 364 + week * 7] = 1.0;
            }
        }
        let last_monday = (700..730).rev().find(|i| i % 7 == 0).unwrap();
        values[last_monday] = 1.0;
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &insufficient_prediction());

        let timing = report.factor(AnomalyFactorKind::TimingIrregularity).unwrap();
        assert!((timing.score - 1.0).abs() < 1e-12, "{}", timing.detail);
    }

    #[test]
    fn short_series_has_no_deviation_factor() {
        let report = AnomalyScorer::default().score(&series_from(monday(), vec![1.0; 10]), &insufficient_prediction());
        assert!(!report.factor(AnomalyFactorKind::StatisticalDeviation).unwrap().available);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.level, AnomalyLevel::Low);
    }

    #[test]
    fn score_is_bounded() {
        let mut values = vec![0.0; 180];
        values.extend(std::iter::repeat(9.0).take(30));
        let report = AnomalyScorer::default().score(&series_from(monday(), values), &prediction_with_agreement(0.0));
        assert!((0.0..=1.0).contains(&report.score));
        assert_eq!(report.level, AnomalyLevel::Critical);
        assert_eq!(
            report.dominant_factor().map(|f| f.kind),
            Some(AnomalyFactorKind::StatisticalDeviation)
        );
    }
}
