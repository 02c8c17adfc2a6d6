//! Ensemble combination of the cyclical, regime, and analog models.
//!
//! Each model either contributes a point estimate in a shared unit (expected
//! change of mean activity per bucket over the horizon, relative to the
//! entity's trailing mean) or is explicitly unavailable with a reason. The
//! combiner always returns a prediction: when no model is available the
//! prediction is `InsufficientData` with zero value, confidence and agreement.

use disclosure_core::stats::weighted_mean_std;
use disclosure_core::{AnalyticsError, AnalyticsResult, EnsembleConfig};
use serde::{Deserialize, Serialize};

use crate::analog::AnalogAnalysis;
use crate::cyclical::{CyclicalAnalysis, ForecastComparison};
use crate::regime::RegimeAnalysis;
use crate::timeseries::EntityTimeSeries;

/// Number of sub-models feeding the ensemble.
pub const MODEL_COUNT: usize = 3;

/// Output slot of one sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> ModelOutcome<T> {
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn as_available(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl<T> From<AnalyticsResult<T>> for ModelOutcome<T> {
    fn from(result: AnalyticsResult<T>) -> Self {
        match result {
            Ok(value) => Self::Available(value),
            Err(e) => Self::unavailable(e.to_string()),
        }
    }
}

/// Per-model outputs for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutputs {
    pub cyclical: ModelOutcome<CyclicalAnalysis>,
    pub regime: ModelOutcome<RegimeAnalysis>,
    pub analog: ModelOutcome<AnalogAnalysis>,
}

impl ModelOutputs {
    /// All three slots unavailable for the same reason.
    #[must_use]
    pub fn unavailable(reason: &str) -> Self {
        Self {
            cyclical: ModelOutcome::unavailable(reason),
            regime: ModelOutcome::unavailable(reason),
            analog: ModelOutcome::unavailable(reason),
        }
    }

    #[must_use]
    pub fn available_count(&self) -> usize {
        usize::from(self.cyclical.is_available())
            + usize::from(self.regime.is_available())
            + usize::from(self.analog.is_available())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Cyclical,
    Regime,
    Analog,
}

impl ModelKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cyclical => "cyclical",
            Self::Regime => "regime",
            Self::Analog => "analog",
        }
    }
}

/// What one model added to the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelContribution {
    Used {
        model: ModelKind,
        /// Expected change of mean activity per bucket
        estimate: f64,
        confidence: f64,
        /// Normalised weight in the combination
        weight: f64,
        evidence: String,
    },
    Unavailable {
        model: ModelKind,
        reason: String,
    },
}

impl ModelContribution {
    #[must_use]
    pub const fn model(&self) -> ModelKind {
        match self {
            Self::Used { model, .. } | Self::Unavailable { model, .. } => *model,
        }
    }

    #[must_use]
    pub const fn is_used(&self) -> bool {
        matches!(self, Self::Used { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    Increase,
    Decrease,
    Stable,
    RegimeChange,
    CyclePeak,
    Anomaly,
    InsufficientData,
}

impl PredictionType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Stable => "stable",
            Self::RegimeChange => "regime change",
            Self::CyclePeak => "cycle peak",
            Self::Anomaly => "anomaly",
            Self::InsufficientData => "insufficient data",
        }
    }
}

/// Combined forecast for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub entity_id: String,
    pub horizon_days: u32,
    pub prediction_type: PredictionType,
    /// Expected change of mean activity per bucket over the horizon
    pub predicted_value: f64,
    pub confidence: f64,
    pub model_agreement: f64,
    pub contributions: Vec<ModelContribution>,
    /// Magnitude above which a change counts as an increase or decrease
    pub threshold: f64,
    /// Trailing mean activity the estimates are measured against
    pub baseline_activity: f64,
    /// Probability of leaving the current regime within the horizon
    pub regime_change_probability: Option<f64>,
    /// Buckets until the first forecast cycle peak
    pub cycle_peak_offset: Option<usize>,
    pub notes: Vec<String>,
}

impl EnsemblePrediction {
    #[must_use]
    pub fn is_insufficient(&self) -> bool {
        self.prediction_type == PredictionType::InsufficientData
    }

    #[must_use]
    pub fn models_used(&self) -> usize {
        self.contributions.iter().filter(|c| c.is_used()).count()
    }
}

/// Single model's estimate before combination.
#[derive(Debug, Clone)]
struct Estimate {
    model: ModelKind,
    value: f64,
    confidence: f64,
    evidence: String,
}

/// Merges sub-model outputs into one `EnsemblePrediction`.
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
    forecast_components: usize,
    scale_window: usize,
}

impl Default for EnsembleCombiner {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}

impl EnsembleCombiner {
    #[must_use]
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            forecast_components: 3,
            scale_window: 90,
        }
    }

    /// Number of cycles used when reconstructing the cyclical forecast.
    #[must_use]
    pub fn with_forecast_components(mut self, components: usize) -> Self {
        self.forecast_components = components.max(1);
        self
    }

    /// Trailing window defining the entity's activity scale.
    #[must_use]
    pub fn with_scale_window(mut self, window: usize) -> Self {
        self.scale_window = window.max(1);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Validates a requested horizon.
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `1 <= horizon_days <= max_horizon_days`.
    pub fn validate_horizon(&self, horizon_days: u32) -> AnalyticsResult<()> {
        if horizon_days == 0 || horizon_days > self.config.max_horizon_days {
            return Err(AnalyticsError::InvalidParameter(format!(
                "horizon must be within 1..={} days, got {horizon_days}",
                self.config.max_horizon_days
            )));
        }
        Ok(())
    }

    /// Combines the model outputs for `series` over `horizon_days`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an out-of-range horizon. Unavailable
    /// sub-models never produce an error.
    pub fn combine(
        &self,
        series: &EntityTimeSeries,
        outputs: &ModelOutputs,
        horizon_days: u32,
    ) -> AnalyticsResult<EnsemblePrediction> {
        self.validate_horizon(horizon_days)?;

        let bucket = series.bucket_days.max(1);
        let steps = horizon_days.div_ceil(bucket).max(1);
        let baseline = series.trailing_mean(self.scale_window);
        let threshold = (self.config.relative_threshold * baseline).max(self.config.min_threshold);

        let mut contributions = Vec::with_capacity(MODEL_COUNT);
        let mut estimates = Vec::with_capacity(MODEL_COUNT);
        let mut notes = Vec::new();

        let cyclical = self.cyclical_estimate(&outputs.cyclical, steps as usize, baseline, threshold, &mut notes);
        let cycle_peak_offset = cyclical.as_ref().ok().and_then(|(_, peak)| *peak);
        push_estimate(ModelKind::Cyclical, cyclical.map(|(e, _)| e), &mut estimates, &mut contributions);

        let regime = regime_estimate(&outputs.regime, steps, baseline);
        let regime_change_probability = outputs
            .regime
            .as_available()
            .map(|analysis| analysis.leave_probability(steps));
        push_estimate(ModelKind::Regime, regime, &mut estimates, &mut contributions);

        let analog = analog_estimate(&outputs.analog, horizon_days, baseline);
        push_estimate(ModelKind::Analog, analog, &mut estimates, &mut contributions);

        if estimates.is_empty() {
            notes.push("no sub-model could produce an estimate".to_string());
            for c in &contributions {
                if let ModelContribution::Unavailable { model, reason } = c {
                    notes.push(format!("{}: {reason}", model.as_str()));
                }
            }
            tracing::debug!(entity = %series.entity_id, "All sub-models unavailable");
            return Ok(EnsemblePrediction {
                entity_id: series.entity_id.clone(),
                horizon_days,
                prediction_type: PredictionType::InsufficientData,
                predicted_value: 0.0,
                confidence: 0.0,
                model_agreement: 0.0,
                contributions,
                threshold,
                baseline_activity: baseline,
                regime_change_probability: None,
                cycle_peak_offset: None,
                notes,
            });
        }

        let confidences: Vec<f64> = estimates.iter().map(|e| e.confidence.clamp(0.0, 1.0)).collect();
        let weights: Vec<f64> = if confidences.iter().sum::<f64>() < f64::EPSILON {
            vec![1.0; estimates.len()]
        } else {
            confidences.clone()
        };
        let weight_total: f64 = weights.iter().sum();
        let values: Vec<f64> = estimates.iter().map(|e| e.value).collect();
        let (predicted_value, dispersion) = weighted_mean_std(&values, &weights).unwrap_or((0.0, 0.0));

        let model_agreement = if estimates.len() == 1 {
            1.0
        } else {
            let scale = predicted_value.abs().max(baseline).max(1e-9);
            1.0 - (dispersion / scale).min(1.0)
        };

        let mean_confidence = confidences.iter().zip(&weights).map(|(c, w)| c * w).sum::<f64>() / weight_total;
        let coverage = (estimates.len() as f64 / MODEL_COUNT as f64).sqrt();
        let confidence = (mean_confidence * (0.5 + 0.5 * model_agreement) * coverage).clamp(0.0, 1.0);

        // Fill in normalised weights now that the total is known
        let mut used = estimates.iter().zip(&weights);
        for c in &mut contributions {
            if let ModelContribution::Used { weight, .. } = c {
                if let Some((_, w)) = used.next() {
                    *weight = w / weight_total;
                }
            }
        }

        let prediction_type = self.classify(
            estimates.len(),
            model_agreement,
            regime_change_probability,
            predicted_value,
            threshold,
            cycle_peak_offset,
            steps as usize,
        );
        notes.push(format!(
            "{} of {MODEL_COUNT} models contributed; agreement {:.2}",
            estimates.len(),
            model_agreement
        ));

        tracing::debug!(
            entity = %series.entity_id,
            prediction = prediction_type.as_str(),
            value = predicted_value,
            confidence,
            agreement = model_agreement,
            "Ensemble prediction combined"
        );

        Ok(EnsemblePrediction {
            entity_id: series.entity_id.clone(),
            horizon_days,
            prediction_type,
            predicted_value,
            confidence,
            model_agreement,
            contributions,
            threshold,
            baseline_activity: baseline,
            regime_change_probability,
            cycle_peak_offset,
            notes,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        available: usize,
        agreement: f64,
        leave_probability: Option<f64>,
        value: f64,
        threshold: f64,
        cycle_peak: Option<usize>,
        steps: usize,
    ) -> PredictionType {
        if available >= 2 && agreement < self.config.anomaly_agreement {
            PredictionType::Anomaly
        } else if leave_probability.is_some_and(|p| p >= self.config.regime_change_probability) {
            PredictionType::RegimeChange
        } else if value > threshold {
            PredictionType::Increase
        } else if value < -threshold {
            PredictionType::Decrease
        } else if cycle_peak.is_some_and(|offset| offset < steps) {
            PredictionType::CyclePeak
        } else {
            PredictionType::Stable
        }
    }

    /// Returns the estimate and the first forecast peak offset.
    fn cyclical_estimate(
        &self,
        outcome: &ModelOutcome<CyclicalAnalysis>,
        steps: usize,
        baseline: f64,
        threshold: f64,
        notes: &mut Vec<String>,
    ) -> Result<(Estimate, Option<usize>), String> {
        let analysis = match outcome {
            ModelOutcome::Available(analysis) => analysis,
            ModelOutcome::Unavailable { reason } => return Err(reason.clone()),
        };
        let Some(dominant) = analysis.patterns.first() else {
            return Err("no cyclical patterns detected".to_string());
        };

        let forecast = analysis
            .forecast(steps, self.forecast_components)
            .map_err(|e| e.to_string())?;
        let Some(forecast_mean) = forecast.window_mean(0, forecast.len()) else {
            return Err("empty cyclical forecast".to_string());
        };

        if let ForecastComparison::Computed { change, .. } = forecast.half_comparison(steps) {
            if change.abs() > threshold {
                let direction = if change > 0.0 { "rises" } else { "falls" };
                notes.push(format!("cyclical forecast {direction} across the horizon ({change:+.2})"));
            }
        }

        Ok((
            Estimate {
                model: ModelKind::Cyclical,
                value: forecast_mean - baseline,
                confidence: analysis.forecast_confidence(self.forecast_components),
                evidence: format!(
                    "dominant {:.1}-day cycle ({}), strength {:.2}, {} component(s)",
                    dominant.period_days,
                    dominant.category.as_str(),
                    dominant.strength,
                    forecast.components
                ),
            },
            forecast.peak_index,
        ))
    }
}

fn regime_estimate(
    outcome: &ModelOutcome<RegimeAnalysis>,
    steps: u32,
    baseline: f64,
) -> Result<Estimate, String> {
    let analysis = match outcome {
        ModelOutcome::Available(analysis) => analysis,
        ModelOutcome::Unavailable { reason } => return Err(reason.clone()),
    };
    let fit_quality = if analysis.converged { 1.0 } else { 0.7 };
    Ok(Estimate {
        model: ModelKind::Regime,
        value: analysis.expected_activity(steps) - baseline,
        confidence: (analysis.current_probability * fit_quality).clamp(0.0, 1.0),
        evidence: format!(
            "current regime {} (p={:.2}), leave probability {:.2} within horizon",
            analysis.current_label.as_str(),
            analysis.current_probability,
            analysis.leave_probability(steps)
        ),
    })
}

fn analog_estimate(
    outcome: &ModelOutcome<AnalogAnalysis>,
    horizon_days: u32,
    baseline: f64,
) -> Result<Estimate, String> {
    let analysis = match outcome {
        ModelOutcome::Available(analysis) => analysis,
        ModelOutcome::Unavailable { reason } => return Err(reason.clone()),
    };
    let Some(consensus) = &analysis.consensus else {
        return Err("no historical analogs above the similarity floor".to_string());
    };
    let Some(change) = consensus.expected_change(horizon_days) else {
        return Err("historical analogs have no realized outcomes".to_string());
    };
    Ok(Estimate {
        model: ModelKind::Analog,
        value: analysis.query_mean + change - baseline,
        confidence: consensus.confidence,
        evidence: format!(
            "{} analog(s), mean similarity {:.2}",
            consensus.sample_size, consensus.average_similarity
        ),
    })
}

fn push_estimate(
    model: ModelKind,
    result: Result<Estimate, String>,
    estimates: &mut Vec<Estimate>,
    contributions: &mut Vec<ModelContribution>,
) {
    match result {
        Ok(estimate) => {
            contributions.push(ModelContribution::Used {
                model: estimate.model,
                estimate: estimate.value,
                confidence: estimate.confidence.clamp(0.0, 1.0),
                weight: 0.0,
                evidence: estimate.evidence.clone(),
            });
            estimates.push(estimate);
        }
        Err(reason) => contributions.push(ModelContribution::Unavailable { model, reason }),
    }
}
