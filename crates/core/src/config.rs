use serde::{Deserialize, Serialize};

/// Top-level configuration for the analytics service.
///
/// Every section has defaults, so a partial TOML file (or none at all)
/// produces a usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub time_series: TimeSeriesConfig,
    pub cyclical: CyclicalConfig,
    pub regime: RegimeConfig,
    pub analog: AnalogConfig,
    pub network: NetworkConfig,
    pub ensemble: EnsembleConfig,
    pub anomaly: AnomalyConfig,
    pub insights: InsightConfig,
    pub cache: CacheConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    /// Days of history analysed by entity-level operations
    pub lookback_days: u32,
    /// Default bucket width in days
    pub bucket_days: u32,
    /// Window used for the entity's trailing activity scale
    pub scale_window: usize,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            lookback_days: 730,
            bucket_days: 1,
            scale_window: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CyclicalConfig {
    /// Most recent samples fed to the transform
    pub max_points: usize,
    /// Minimum full cycles observed before a period is reported
    pub min_cycles: f64,
    /// Peak power as a fraction of the strongest bin
    pub min_relative_power: f64,
    /// Peak power over the median noise floor
    pub min_snr: f64,
    pub max_patterns: usize,
    /// Cycles used when reconstructing a forecast
    pub forecast_components: usize,
}

impl Default for CyclicalConfig {
    fn default() -> Self {
        Self {
            max_points: 2048,
            min_cycles: 3.0,
            min_relative_power: 0.1,
            min_snr: 4.0,
            max_patterns: 5,
            forecast_components: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub n_states: usize,
    pub max_iterations: usize,
    /// Log-likelihood improvement below which EM stops
    pub tolerance: f64,
    /// Rolling window for the local volatility and momentum features
    pub feature_window: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_states: 4,
            max_iterations: 100,
            tolerance: 1e-4,
            feature_window: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    pub window_size: usize,
    pub top_k: usize,
    pub similarity_floor: f64,
    /// Steps before the query window that candidates may not touch
    pub cooldown: usize,
    /// Sakoe-Chiba band radius; `None` uses max(1, window / 10)
    pub band_radius: Option<usize>,
    /// Upper bound on candidate windows scanned per query
    pub max_candidates: usize,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            top_k: 10,
            similarity_floor: 0.7,
            cooldown: 30,
            band_radius: None,
            max_candidates: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub max_lag: usize,
    pub min_overlap_days: usize,
    pub correlation_threshold: f64,
    /// Graph size cap; extra entities are dropped
    pub max_entities: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_lag: 30,
            min_overlap_days: 10,
            correlation_threshold: 0.5,
            max_entities: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub default_horizon_days: u32,
    pub max_horizon_days: u32,
    /// Direction threshold as a fraction of trailing mean activity
    pub relative_threshold: f64,
    /// Absolute floor for the direction threshold (trades/day)
    pub min_threshold: f64,
    /// Agreement below which multi-model output is classified as anomalous
    pub anomaly_agreement: f64,
    /// Probability of leaving the current regime that triggers regime-change
    pub regime_change_probability: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            default_horizon_days: 30,
            max_horizon_days: 365,
            relative_threshold: 0.1,
            min_threshold: 0.01,
            anomaly_agreement: 0.3,
            regime_change_probability: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub recent_days: usize,
    pub baseline_days: usize,
    pub deviation_weight: f64,
    pub disagreement_weight: f64,
    pub timing_weight: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            recent_days: 30,
            baseline_days: 180,
            deviation_weight: 0.4,
            disagreement_weight: 0.3,
            timing_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub pattern_confidence_floor: f64,
    pub prediction_confidence_floor: f64,
    pub anomaly_score_floor: f64,
    /// |r| above which an unexplained edge becomes an insight
    pub strong_correlation: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            pattern_confidence_floor: 0.5,
            prediction_confidence_floor: 0.3,
            anomaly_score_floor: 0.4,
            strong_correlation: 0.7,
        }
    }
}

/// Time-to-live per analysis method, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub time_series_ttl_secs: u64,
    pub model_ttl_secs: u64,
    pub ensemble_ttl_secs: u64,
    pub network_ttl_secs: u64,
    /// Slot limit per analysis method; the oldest slots are evicted beyond it
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            time_series_ttl_secs: 60,
            model_ttl_secs: 600,
            ensemble_ttl_secs: 1800,
            network_ttl_secs: 3600,
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Timeout for single-model operations
    pub model_timeout_ms: u64,
    /// Timeout for ensemble, anomaly, and insight operations
    pub ensemble_timeout_ms: u64,
    pub network_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_timeout_ms: 10_000,
            ensemble_timeout_ms: 30_000,
            network_timeout_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.regime.n_states, 4);
        assert_eq!(config.analog.window_size, 30);
        assert_eq!(config.analog.top_k, 10);
        assert!((config.analog.similarity_floor - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.network.max_lag, 30);
        assert!((config.cyclical.min_cycles - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cache_ttls_grow_with_cost() {
        let cache = CacheConfig::default();
        assert!(cache.time_series_ttl_secs < cache.model_ttl_secs);
        assert!(cache.model_ttl_secs < cache.ensemble_ttl_secs);
        assert!(cache.ensemble_ttl_secs <= cache.network_ttl_secs);
    }

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let config: AnalyticsConfig =
            serde_json::from_str(r#"{"regime": {"n_states": 3}}"#).unwrap();
        assert_eq!(config.regime.n_states, 3);
        assert_eq!(config.regime.max_iterations, 100);
        assert_eq!(config.analog.window_size, 30);
    }
}
