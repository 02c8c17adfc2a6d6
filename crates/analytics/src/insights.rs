//! Human-readable findings assembled from the model outputs.
//!
//! Every insight carries a severity, a confidence derived from the evidence
//! behind it, a templated description, the numeric evidence itself, and
//! recommended follow-ups.

use std::collections::BTreeMap;

use disclosure_core::stats::weighted_mean_std;
use disclosure_core::InsightConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::anomaly::{AnomalyLevel, AnomalyReport};
use crate::cyclical::{CyclicalAnalysis, CyclicalPattern};
use crate::ensemble::{EnsemblePrediction, PredictionType};
use crate::network::{CorrelationEdge, CorrelationNetwork, EdgeHypothesis};
use crate::regime::{RegimeAnalysis, RegimeLabel};

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl From<AnomalyLevel> for Severity {
    fn from(level: AnomalyLevel) -> Self {
        match level {
            AnomalyLevel::Low => Self::Low,
            AnomalyLevel::Medium => Self::Medium,
            AnomalyLevel::High => Self::High,
            AnomalyLevel::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    CyclicalPattern,
    RegimeStatus,
    RegimeTransition,
    Correlation,
    Prediction,
    DataQuality,
    Anomaly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub entity_id: String,
    pub kind: InsightKind,
    pub severity: Severity,
    pub confidence: f64,
    pub title: String,
    pub description: String,
    pub evidence: BTreeMap<String, Value>,
    pub recommended_actions: Vec<String>,
}

/// Everything known about one entity when generating insights.
#[derive(Debug, Clone, Copy)]
pub struct InsightContext<'a> {
    pub entity_id: &'a str,
    pub cyclical: Option<&'a CyclicalAnalysis>,
    pub regime: Option<&'a RegimeAnalysis>,
    pub prediction: &'a EnsemblePrediction,
    pub anomaly: Option<&'a AnomalyReport>,
    pub network: Option<&'a CorrelationNetwork>,
}

#[derive(Debug, Clone, Default)]
pub struct InsightGenerator {
    config: InsightConfig,
}

impl InsightGenerator {
    #[must_use]
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    /// Generates all insights for the entity, most severe first.
    #[must_use]
    pub fn generate(&self, ctx: &InsightContext<'_>) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let Some(cyclical) = ctx.cyclical {
            insights.extend(
                cyclical
                    .patterns
                    .iter()
                    .filter(|p| p.confidence >= self.config.pattern_confidence_floor)
                    .map(|p| cycle_insight(ctx.entity_id, p)),
            );
        }

        if let Some(regime) = ctx.regime {
            insights.extend(regime_insights(ctx.entity_id, regime, ctx.prediction));
        }

        if let Some(network) = ctx.network {
            insights.extend(
                network
                    .edges_for(ctx.entity_id)
                    .filter(|e| {
                        e.hypothesis == EdgeHypothesis::Unexplained
                            && e.coefficient.abs() >= self.config.strong_correlation
                    })
                    .map(|e| correlation_insight(ctx.entity_id, e)),
            );
        }

        if ctx.prediction.is_insufficient() {
            insights.push(data_quality_insight(ctx.entity_id, ctx.prediction));
        } else if ctx.prediction.confidence >= self.config.prediction_confidence_floor {
            insights.push(prediction_insight(ctx.entity_id, ctx.prediction));
        }

        if let Some(anomaly) = ctx.anomaly {
            if anomaly.score >= self.config.anomaly_score_floor {
                insights.push(anomaly_insight(ctx.entity_id, anomaly));
            }
        }

        sort_insights(&mut insights);
        tracing::debug!(entity = %ctx.entity_id, count = insights.len(), "Insights generated");
        insights
    }
}

/// Keeps insights meeting both minimums, sorted by severity then confidence.
#[must_use]
pub fn filter_insights(mut insights: Vec<Insight>, min_confidence: f64, min_severity: Severity) -> Vec<Insight> {
    insights.retain(|i| i.confidence >= min_confidence && i.severity >= min_severity);
    sort_insights(&mut insights);
    insights
}

fn sort_insights(insights: &mut [Insight]) {
    insights.sort_by(|a, b| {
        b.severity.cmp(&a.severity).then_with(|| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
}

fn evidence<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn cycle_insight(entity_id: &str, pattern: &CyclicalPattern) -> Insight {
    let severity = if pattern.confidence >= 0.8 && pattern.strength >= 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    };
    Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::CyclicalPattern,
        severity,
        confidence: pattern.confidence,
        title: format!("Recurring {} trading cycle", pattern.category.as_str()),
        description: format!(
            "Trading activity repeats roughly every {:.1} days, observed over {:.1} cycles \
             and carrying {:.0}% of the non-trend variation.",
            pattern.period_days,
            pattern.cycles_observed,
            pattern.strength * 100.0
        ),
        evidence: evidence([
            ("period_days", json!(pattern.period_days)),
            ("strength", json!(pattern.strength)),
            ("cycles_observed", json!(pattern.cycles_observed)),
            ("category", json!(pattern.category.as_str())),
        ]),
        recommended_actions: vec![
            "Check whether cycle peaks line up with committee or earnings calendars".to_string(),
            "Monitor the next expected peak for confirmation".to_string(),
        ],
    }
}

fn regime_insights(entity_id: &str, regime: &RegimeAnalysis, prediction: &EnsemblePrediction) -> Vec<Insight> {
    let Some(current) = regime.current() else {
        return Vec::new();
    };
    let severity = match regime.current_label {
        RegimeLabel::HighActivity | RegimeLabel::HighVolatility => Severity::Medium,
        RegimeLabel::ModerateActivity => Severity::Low,
        RegimeLabel::LowActivity | RegimeLabel::Dormant => Severity::Info,
    };

    let mut insights = vec![Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::RegimeStatus,
        severity,
        confidence: regime.current_probability,
        title: format!("Currently in a {} regime", regime.current_label.as_str()),
        description: format!(
            "The latest activity is best explained by a {} regime averaging {:.2} trades per period; \
             it is expected to last about {:.0} more periods.",
            regime.current_label.as_str(),
            current.mean_activity,
            regime.expected_remaining_duration
        ),
        evidence: evidence([
            ("mean_activity", json!(current.mean_activity)),
            ("volatility", json!(current.volatility)),
            ("stay_probability", json!(regime.stay_probability())),
            ("regime_switches", json!(regime.transitions_observed())),
        ]),
        recommended_actions: vec!["Compare the regime with the entity's committee schedule".to_string()],
    }];

    if prediction.prediction_type == PredictionType::RegimeChange {
        let leave = prediction.regime_change_probability.unwrap_or(0.0);
        insights.push(Insight {
            entity_id: entity_id.to_string(),
            kind: InsightKind::RegimeTransition,
            severity: Severity::Medium,
            confidence: leave,
            title: "Regime change likely".to_string(),
            description: format!(
                "There is a {:.0}% chance of leaving the {} regime within {} days.",
                leave * 100.0,
                regime.current_label.as_str(),
                prediction.horizon_days
            ),
            evidence: evidence([
                ("leave_probability", json!(leave)),
                ("horizon_days", json!(prediction.horizon_days)),
            ]),
            recommended_actions: vec!["Watch for a shift in trading frequency".to_string()],
        });
    }
    insights
}

fn correlation_insight(entity_id: &str, edge: &CorrelationEdge) -> Insight {
    let other = edge.counterpart(entity_id).unwrap_or_default();
    let strength = edge.coefficient.abs();
    Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::Correlation,
        severity: if strength >= 0.9 { Severity::High } else { Severity::Medium },
        confidence: (1.0 - edge.p_value).clamp(0.0, 1.0),
        title: format!("Unexplained correlation with {other}"),
        description: format!(
            "Activity correlates with {other} at r = {:.2} (lag {} days, {} shared active days) \
             with no shared family, party, or state.",
            edge.coefficient, edge.lag_days, edge.overlap_days
        ),
        evidence: evidence([
            ("counterpart", json!(other)),
            ("coefficient", json!(edge.coefficient)),
            ("p_value", json!(edge.p_value)),
            ("lag_days", json!(edge.lag_days)),
        ]),
        recommended_actions: vec![
            format!("Review overlapping tickers between {entity_id} and {other}"),
            "Check for shared advisers or information sources".to_string(),
        ],
    }
}

fn prediction_insight(entity_id: &str, prediction: &EnsemblePrediction) -> Insight {
    let severity = match prediction.prediction_type {
        PredictionType::Anomaly => Severity::High,
        PredictionType::RegimeChange => Severity::Medium,
        PredictionType::Increase | PredictionType::Decrease => {
            if prediction.predicted_value.abs() > 2.0 * prediction.threshold {
                Severity::Medium
            } else {
                Severity::Low
            }
        }
        PredictionType::CyclePeak => Severity::Low,
        PredictionType::Stable | PredictionType::InsufficientData => Severity::Info,
    };
    Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::Prediction,
        severity,
        confidence: prediction.confidence,
        title: format!("Ensemble expects {}", prediction.prediction_type.as_str()),
        description: format!(
            "Over the next {} days activity is expected to change by {:+.2} per period \
             against a baseline of {:.2} ({} model(s), agreement {:.2}).",
            prediction.horizon_days,
            prediction.predicted_value,
            prediction.baseline_activity,
            prediction.models_used(),
            prediction.model_agreement
        ),
        evidence: evidence([
            ("predicted_value", json!(prediction.predicted_value)),
            ("threshold", json!(prediction.threshold)),
            ("model_agreement", json!(prediction.model_agreement)),
            ("models_used", json!(prediction.models_used())),
        ]),
        recommended_actions: vec!["Re-evaluate after the next disclosure filing".to_string()],
    }
}

fn data_quality_insight(entity_id: &str, prediction: &EnsemblePrediction) -> Insight {
    let total = prediction.contributions.len();
    let unavailable = total - prediction.models_used();
    let unavailable_share = unavailable as f64 / total.max(1) as f64;
    // Recent activity makes missing history a weaker explanation
    let confidence = unavailable_share / (1.0 + prediction.baseline_activity.max(0.0));
    Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::DataQuality,
        severity: Severity::Info,
        confidence: confidence.clamp(0.0, 1.0),
        title: "Not enough trading history for a prediction".to_string(),
        description: prediction.notes.join("; "),
        evidence: evidence([
            ("baseline_activity", json!(prediction.baseline_activity)),
            ("models_unavailable", json!(unavailable)),
        ]),
        recommended_actions: vec!["Extend the lookback or wait for more disclosures".to_string()],
    }
}

/// Factor coverage scaled by how closely the available factor scores agree.
fn anomaly_confidence(report: &AnomalyReport) -> f64 {
    let (scores, weights): (Vec<f64>, Vec<f64>) = report
        .factors
        .iter()
        .filter(|f| f.available)
        .map(|f| (f.score, f.weight))
        .unzip();
    if scores.is_empty() {
        return 0.0;
    }
    let coverage = scores.len() as f64 / report.factors.len() as f64;
    // Scores lie in [0, 1], so the spread is at most 0.5
    let agreement = weighted_mean_std(&scores, &weights).map_or(1.0, |(_, sd)| 1.0 - (2.0 * sd).min(1.0));
    (coverage * (0.5 + 0.5 * agreement)).clamp(0.0, 1.0)
}

fn anomaly_insight(entity_id: &str, report: &AnomalyReport) -> Insight {
    let dominant = report
        .dominant_factor()
        .map_or("no single factor", |f| f.kind.as_str());
    Insight {
        entity_id: entity_id.to_string(),
        kind: InsightKind::Anomaly,
        severity: report.level.into(),
        confidence: anomaly_confidence(report),
        title: format!("{} anomaly in recent trading", capitalize(report.level.as_str())),
        description: format!(
            "Composite anomaly score {:.2}, driven mainly by {dominant}.",
            report.score
        ),
        evidence: report
            .factors
            .iter()
            .filter(|f| f.available)
            .map(|f| (f.kind.as_str().replace(' ', "_"), json!(f.score)))
            .collect(),
        recommended_actions: vec![
            "Review the underlying filings for the recent window".to_string(),
            "Cross-check trade timing against legislative events".to_string(),
        ],
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
