//! Async facade exposing every analysis operation.
//!
//! Each operation fetches events through the `TradeEventStore`, grids them
//! into a series, runs the CPU-bound model on the blocking pool, and caches
//! the result keyed by the entity's data version. Every call is bounded by a
//! timeout; expiry abandons the worker and surfaces `AnalyticsError::Timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use disclosure_core::{
    AnalyticsConfig, AnalyticsError, AnalyticsResult, DateRange, MetadataProvider, TradeEventStore,
};

use crate::analog::{AnalogAnalysis, AnalogMatcher};
use crate::anomaly::{AnomalyReport, AnomalyScorer};
use crate::cache::{AnalysisCache, AnalysisMethod, CacheKey, CacheStats, EntityScope};
use crate::cyclical::{CyclicalAnalysis, CyclicalDetector};
use crate::ensemble::{EnsembleCombiner, EnsemblePrediction, ModelOutcome, ModelOutputs};
use crate::insights::{filter_insights, Insight, InsightContext, InsightGenerator, Severity};
use crate::network::{CorrelationNetwork, NetworkAnalyzer, NetworkInput};
use crate::regime::{RegimeAnalysis, RegimeDetector};
use crate::timeseries::{EntityTimeSeries, TimeSeriesBuilder};

/// Stateless model instances shared with blocking workers.
#[derive(Debug)]
struct Models {
    cyclical: CyclicalDetector,
    regime: RegimeDetector,
    analog: AnalogMatcher,
    network: NetworkAnalyzer,
    combiner: EnsembleCombiner,
    scorer: AnomalyScorer,
    insights: InsightGenerator,
}

#[derive(Debug)]
struct Caches {
    time_series: AnalysisCache<Arc<EntityTimeSeries>>,
    cyclical: AnalysisCache<Arc<CyclicalAnalysis>>,
    regime: AnalysisCache<Arc<RegimeAnalysis>>,
    analog: AnalysisCache<Arc<AnalogAnalysis>>,
    ensemble: AnalysisCache<Arc<EnsemblePrediction>>,
    network: AnalysisCache<Arc<CorrelationNetwork>>,
    anomaly: AnalysisCache<Arc<AnomalyReport>>,
    insights: AnalysisCache<Arc<Vec<Insight>>>,
}

impl Caches {
    fn new(config: &disclosure_core::CacheConfig) -> Self {
        let series = Duration::from_secs(config.time_series_ttl_secs);
        let model = Duration::from_secs(config.model_ttl_secs);
        let ensemble = Duration::from_secs(config.ensemble_ttl_secs);
        let network = Duration::from_secs(config.network_ttl_secs);
        let cap = config.max_entries;
        Self {
            time_series: AnalysisCache::new("time_series", series).with_max_entries(cap),
            cyclical: AnalysisCache::new("cyclical", model).with_max_entries(cap),
            regime: AnalysisCache::new("regime", model).with_max_entries(cap),
            analog: AnalysisCache::new("analog", model).with_max_entries(cap),
            ensemble: AnalysisCache::new("ensemble", ensemble).with_max_entries(cap),
            network: AnalysisCache::new("network", network).with_max_entries(cap),
            anomaly: AnalysisCache::new("anomaly", ensemble).with_max_entries(cap),
            insights: AnalysisCache::new("insights", ensemble).with_max_entries(cap),
        }
    }
}

/// Entry point for every analysis over one trade store.
///
/// Entity-level operations analyse `lookback_days` ending at `as_of`.
pub struct AnalyticsService<S: ?Sized, M: ?Sized> {
    store: Arc<S>,
    metadata: Arc<M>,
    config: AnalyticsConfig,
    as_of: NaiveDate,
    peer_group: Vec<String>,
    models: Arc<Models>,
    caches: Caches,
}

impl<S, M> AnalyticsService<S, M>
where
    S: TradeEventStore + ?Sized,
    M: MetadataProvider + ?Sized,
{
    #[must_use]
    pub fn new(store: Arc<S>, metadata: Arc<M>, config: AnalyticsConfig, as_of: NaiveDate) -> Self {
        let models = Models {
            cyclical: CyclicalDetector::new(config.cyclical.clone()),
            regime: RegimeDetector::new(config.regime.clone()),
            analog: AnalogMatcher::new(config.analog.clone()),
            network: NetworkAnalyzer::new(config.network.clone()),
            combiner: EnsembleCombiner::new(config.ensemble.clone())
                .with_forecast_components(config.cyclical.forecast_components)
                .with_scale_window(config.time_series.scale_window),
            scorer: AnomalyScorer::new(config.anomaly.clone()),
            insights: InsightGenerator::new(config.insights.clone()),
        };
        let caches = Caches::new(&config.cache);
        Self {
            store,
            metadata,
            config,
            as_of,
            peer_group: Vec::new(),
            models: Arc::new(models),
            caches,
        }
    }

    /// Entities whose correlation edges are considered when generating insights.
    #[must_use]
    pub fn with_peer_group(mut self, entity_ids: Vec<String>) -> Self {
        self.peer_group = entity_ids;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    #[must_use]
    pub const fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// The analysis window for entity-level operations.
    #[must_use]
    pub fn lookback_range(&self) -> DateRange {
        DateRange::ending_at(self.as_of, self.config.time_series.lookback_days)
    }

    // ------------------------------------------------------------------
    // Exposed operations
    // ------------------------------------------------------------------

    /// Grids the entity's events over `range` into `bucket_days` buckets.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty id or a zero bucket; `InsufficientData`
    /// for a range without days; `Store` when the trade store fails;
    /// `Timeout` on expiry.
    pub async fn get_time_series(
        &self,
        entity_id: &str,
        range: DateRange,
        bucket_days: u32,
    ) -> AnalyticsResult<Arc<EntityTimeSeries>> {
        validate_entity(entity_id)?;
        if range.num_days() == 0 {
            tracing::debug!(entity = %entity_id, start = %range.start, end = %range.end, "Empty date range");
            return Err(AnalyticsError::insufficient("time_series", 1, 0));
        }
        let version = self.data_version(entity_id).await?;
        bounded("time_series", self.model_timeout(), async {
            self.time_series_at(entity_id, range, bucket_days, version).await
        })
        .await
    }

    /// Dominant cycles in the entity's lookback series.
    ///
    /// An entity without periodic structure yields an empty pattern list.
    ///
    /// # Errors
    /// `InsufficientData` for a series too short to analyse, plus the
    /// failures of `get_time_series`.
    pub async fn get_cyclical_patterns(&self, entity_id: &str) -> AnalyticsResult<Arc<CyclicalAnalysis>> {
        let started = Instant::now();
        let analysis = bounded("cyclical", self.model_timeout(), async {
            let (series, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Cyclical, version, &());
            self.caches
                .cyclical
                .get_or_try_compute(key, || async {
                    let models = Arc::clone(&self.models);
                    blocking("cyclical", move || {
                        models.cyclical.detect(series.activity(), series.bucket_days)
                    })
                    .await
                    .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entity = %entity_id,
            patterns = analysis.patterns.len(),
            elapsed_ms = elapsed_ms(started),
            "Cyclical analysis complete"
        );
        Ok(analysis)
    }

    /// Latent activity regimes, the current state, and its history.
    ///
    /// # Errors
    /// `InsufficientData` or `ModelFit` when the HMM cannot be fitted, plus
    /// the failures of `get_time_series`.
    pub async fn get_regime_analysis(&self, entity_id: &str) -> AnalyticsResult<Arc<RegimeAnalysis>> {
        let started = Instant::now();
        let analysis = bounded("regime", self.model_timeout(), async {
            let (series, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Regime, version, &());
            self.caches
                .regime
                .get_or_try_compute(key, || async {
                    let models = Arc::clone(&self.models);
                    blocking("regime", move || models.regime.detect(&series))
                        .await
                        .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entity = %entity_id,
            regime = analysis.current_label.as_str(),
            converged = analysis.converged,
            elapsed_ms = elapsed_ms(started),
            "Regime analysis complete"
        );
        Ok(analysis)
    }

    /// Historical windows resembling the latest `window_size` buckets.
    ///
    /// `None` parameters fall back to the configured defaults.
    ///
    /// # Errors
    /// `InvalidParameter` for a window below 2 or `top_k == 0`;
    /// `InsufficientData` or `ModelFit` when no search is possible.
    pub async fn get_historical_matches(
        &self,
        entity_id: &str,
        window_size: Option<usize>,
        top_k: Option<usize>,
    ) -> AnalyticsResult<Arc<AnalogAnalysis>> {
        let window_size = window_size.unwrap_or(self.config.analog.window_size);
        let top_k = top_k.unwrap_or(self.config.analog.top_k);
        let started = Instant::now();
        let analysis = bounded("analog", self.model_timeout(), async {
            let (series, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Analog, version, &(window_size, top_k));
            self.caches
                .analog
                .get_or_try_compute(key, || async {
                    let models = Arc::clone(&self.models);
                    blocking("analog", move || models.analog.find_matches(&series, window_size, top_k))
                        .await
                        .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entity = %entity_id,
            matches = analysis.matches.len(),
            scanned = analysis.candidates_scanned,
            elapsed_ms = elapsed_ms(started),
            "Analog search complete"
        );
        Ok(analysis)
    }

    /// Combined prediction over `horizon_days` (default from config).
    ///
    /// Sub-models that lack data are reported as unavailable inside the
    /// prediction; an entity with no usable history yields an
    /// `InsufficientData` prediction rather than an error.
    ///
    /// # Errors
    /// `InvalidParameter` for an out-of-range horizon; `Store` and `Timeout`
    /// from the store or any sub-model.
    pub async fn get_ensemble_prediction(
        &self,
        entity_id: &str,
        horizon_days: Option<u32>,
    ) -> AnalyticsResult<Arc<EnsemblePrediction>> {
        let horizon = horizon_days.unwrap_or(self.config.ensemble.default_horizon_days);
        self.models.combiner.validate_horizon(horizon)?;
        let started = Instant::now();

        let prediction = bounded("ensemble", self.ensemble_timeout(), async {
            let (series, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Ensemble, version, &horizon);
            self.caches
                .ensemble
                .get_or_try_compute(key, || async {
                    let outputs = self.model_outputs(entity_id).await?;
                    let models = Arc::clone(&self.models);
                    blocking("ensemble", move || models.combiner.combine(&series, &outputs, horizon))
                        .await
                        .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entity = %entity_id,
            horizon_days = horizon,
            prediction = prediction.prediction_type.as_str(),
            confidence = prediction.confidence,
            models_used = prediction.models_used(),
            elapsed_ms = elapsed_ms(started),
            "Ensemble prediction complete"
        );
        Ok(prediction)
    }

    /// Lagged-correlation network across `entity_ids`.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty list or a threshold outside [0, 1];
    /// `Store` and `Timeout` otherwise.
    pub async fn get_correlation_network(
        &self,
        entity_ids: &[String],
        correlation_threshold: Option<f64>,
    ) -> AnalyticsResult<Arc<CorrelationNetwork>> {
        let threshold = correlation_threshold.unwrap_or(self.config.network.correlation_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "correlation threshold must be within [0, 1], got {threshold}"
            )));
        }
        if entity_ids.is_empty() {
            return Err(AnalyticsError::InvalidParameter(
                "network requires at least one entity".to_string(),
            ));
        }
        for id in entity_ids {
            validate_entity(id)?;
        }

        let mut ids = entity_ids.to_vec();
        ids.sort();
        ids.dedup();
        let started = Instant::now();

        let network = bounded("network", self.network_timeout(), async {
            let mut versions = Vec::with_capacity(ids.len());
            for id in &ids {
                versions.push(self.data_version(id).await?);
            }
            // Versions only grow, so the sum changes whenever any member changes
            let key = CacheKey::new(EntityScope::Entities(ids.clone()), AnalysisMethod::Network)
                .with_params(&(self.window_params(), threshold.to_bits()))
                .with_version(versions.iter().sum());

            self.caches
                .network
                .get_or_try_compute(key, || async {
                    let mut inputs = Vec::with_capacity(ids.len());
                    for (id, version) in ids.iter().zip(&versions) {
                        let series = self
                            .time_series_at(
                                id,
                                self.lookback_range(),
                                self.config.time_series.bucket_days,
                                *version,
                            )
                            .await?;
                        let metadata = self.metadata.metadata(id).await.map_err(AnalyticsError::from)?;
                        inputs.push(NetworkInput::new((*series).clone(), metadata));
                    }
                    let models = Arc::clone(&self.models);
                    blocking("network", move || models.network.analyze(&inputs, threshold))
                        .await
                        .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entities = network.entities.len(),
            edges = network.edges.len(),
            clusters = network.clusters.len(),
            truncated = network.truncated,
            elapsed_ms = elapsed_ms(started),
            "Correlation network complete"
        );
        Ok(network)
    }

    /// Composite anomaly score for the entity's recent behaviour.
    ///
    /// # Errors
    /// `Store` and `Timeout`; missing factors are reported inside the report.
    pub async fn get_anomaly_report(&self, entity_id: &str) -> AnalyticsResult<Arc<AnomalyReport>> {
        let started = Instant::now();
        let report = bounded("anomaly", self.ensemble_timeout(), async {
            let (series, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Anomaly, version, &());
            self.caches
                .anomaly
                .get_or_try_compute(key, || async {
                    let prediction = self.get_ensemble_prediction(entity_id, None).await?;
                    let models = Arc::clone(&self.models);
                    blocking("anomaly", move || Ok(models.scorer.score(&series, &prediction)))
                        .await
                        .map(Arc::new)
                })
                .await
        })
        .await?;

        tracing::info!(
            entity = %entity_id,
            score = report.score,
            level = report.level.as_str(),
            elapsed_ms = elapsed_ms(started),
            "Anomaly report complete"
        );
        Ok(report)
    }

    /// Severity-ranked insights at or above both minimums.
    ///
    /// # Errors
    /// `InvalidParameter` for a confidence outside [0, 1]; `Store` and
    /// `Timeout` otherwise.
    pub async fn get_insights(
        &self,
        entity_id: &str,
        min_confidence: f64,
        min_severity: Severity,
    ) -> AnalyticsResult<Vec<Insight>> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "minimum confidence must be within [0, 1], got {min_confidence}"
            )));
        }
        let started = Instant::now();

        let all = bounded("insights", self.ensemble_timeout(), async {
            let (_, version) = self.entity_series(entity_id).await?;
            let key = self.window_key(entity_id, AnalysisMethod::Insights, version, &self.peer_group);
            self.caches
                .insights
                .get_or_try_compute(key, || self.compute_insights(entity_id))
                .await
        })
        .await?;

        let insights = filter_insights(all.as_ref().clone(), min_confidence, min_severity);
        tracing::info!(
            entity = %entity_id,
            generated = all.len(),
            returned = insights.len(),
            elapsed_ms = elapsed_ms(started),
            "Insights complete"
        );
        Ok(insights)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Hit/miss counters per cached method.
    #[must_use]
    pub fn cache_stats(&self) -> Vec<(AnalysisMethod, CacheStats)> {
        vec![
            (AnalysisMethod::TimeSeries, self.caches.time_series.stats()),
            (AnalysisMethod::Cyclical, self.caches.cyclical.stats()),
            (AnalysisMethod::Regime, self.caches.regime.stats()),
            (AnalysisMethod::Analog, self.caches.analog.stats()),
            (AnalysisMethod::Ensemble, self.caches.ensemble.stats()),
            (AnalysisMethod::Network, self.caches.network.stats()),
            (AnalysisMethod::Anomaly, self.caches.anomaly.stats()),
            (AnalysisMethod::Insights, self.caches.insights.stats()),
        ]
    }

    /// Drops expired entries from every cache.
    pub fn purge_expired(&self) -> usize {
        self.caches.time_series.purge_expired()
            + self.caches.cyclical.purge_expired()
            + self.caches.regime.purge_expired()
            + self.caches.analog.purge_expired()
            + self.caches.ensemble.purge_expired()
            + self.caches.network.purge_expired()
            + self.caches.anomaly.purge_expired()
            + self.caches.insights.purge_expired()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn data_version(&self, entity_id: &str) -> AnalyticsResult<u64> {
        self.store
            .data_version(entity_id)
            .await
            .map_err(AnalyticsError::from)
    }

    async fn time_series_at(
        &self,
        entity_id: &str,
        range: DateRange,
        bucket_days: u32,
        version: u64,
    ) -> AnalyticsResult<Arc<EntityTimeSeries>> {
        let builder = TimeSeriesBuilder::new(bucket_days)?;
        let key = CacheKey::entity(entity_id, AnalysisMethod::TimeSeries)
            .with_params(&(range, bucket_days))
            .with_version(version);

        self.caches
            .time_series
            .get_or_try_compute(key, || async {
                let events = self
                    .store
                    .events(entity_id, range)
                    .await
                    .map_err(AnalyticsError::from)?;
                let id = entity_id.to_string();
                let series = blocking("time_series", move || builder.build(&id, &events, range)).await?;
                tracing::debug!(
                    entity = %entity_id,
                    buckets = series.len(),
                    active = series.active_days(),
                    "Time series built"
                );
                Ok(Arc::new(series))
            })
            .await
    }

    /// The lookback series with the version it was built from.
    async fn entity_series(&self, entity_id: &str) -> AnalyticsResult<(Arc<EntityTimeSeries>, u64)> {
        validate_entity(entity_id)?;
        let version = self.data_version(entity_id).await?;
        let series = self
            .time_series_at(
                entity_id,
                self.lookback_range(),
                self.config.time_series.bucket_days,
                version,
            )
            .await?;
        Ok((series, version))
    }

    async fn model_outputs(&self, entity_id: &str) -> AnalyticsResult<ModelOutputs> {
        let (cyclical, regime, analog) = tokio::join!(
            self.get_cyclical_patterns(entity_id),
            self.get_regime_analysis(entity_id),
            self.get_historical_matches(entity_id, None, None),
        );
        Ok(ModelOutputs {
            cyclical: absorb("cyclical", entity_id, cyclical)?,
            regime: absorb("regime", entity_id, regime)?,
            analog: absorb("analog", entity_id, analog)?,
        })
    }

    async fn compute_insights(&self, entity_id: &str) -> AnalyticsResult<Arc<Vec<Insight>>> {
        let (cyclical, regime, prediction, anomaly) = tokio::join!(
            self.get_cyclical_patterns(entity_id),
            self.get_regime_analysis(entity_id),
            self.get_ensemble_prediction(entity_id, None),
            self.get_anomaly_report(entity_id),
        );
        let cyclical = absorb("cyclical", entity_id, cyclical)?;
        let regime = absorb("regime", entity_id, regime)?;
        let prediction = prediction?;
        let anomaly = anomaly?;

        let network = if self.peer_group.is_empty() {
            None
        } else {
            let mut ids = self.peer_group.clone();
            ids.push(entity_id.to_string());
            match self.get_correlation_network(&ids, None).await {
                Ok(network) => Some(network),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(entity = %entity_id, error = %e, "Peer network unavailable for insights");
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let id = entity_id.to_string();
        let models = Arc::clone(&self.models);
        blocking("insights", move || {
            let ctx = InsightContext {
                entity_id: &id,
                cyclical: cyclical.as_available(),
                regime: regime.as_available(),
                prediction: &prediction,
                anomaly: Some(anomaly.as_ref()),
                network: network.as_deref(),
            };
            Ok(models.insights.generate(&ctx))
        })
        .await
        .map(Arc::new)
    }

    fn window_params(&self) -> (NaiveDate, u32, u32) {
        (
            self.as_of,
            self.config.time_series.lookback_days,
            self.config.time_series.bucket_days,
        )
    }

    fn window_key<P: std::hash::Hash + ?Sized>(
        &self,
        entity_id: &str,
        method: AnalysisMethod,
        version: u64,
        params: &P,
    ) -> CacheKey {
        CacheKey::entity(entity_id, method)
            .with_params(&(self.window_params(), params))
            .with_version(version)
    }

    fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.config.runtime.model_timeout_ms)
    }

    fn ensemble_timeout(&self) -> Duration {
        Duration::from_millis(self.config.runtime.ensemble_timeout_ms)
    }

    fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.config.runtime.network_timeout_ms)
    }
}

impl<S: ?Sized, M: ?Sized> std::fmt::Debug for AnalyticsService<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsService")
            .field("as_of", &self.as_of)
            .field("peer_group", &self.peer_group)
            .finish_non_exhaustive()
    }
}

/// Runs `work` under `limit`; on expiry the work is dropped.
async fn bounded<T, F>(operation: &'static str, limit: Duration, work: F) -> AnalyticsResult<T>
where
    F: Future<Output = AnalyticsResult<T>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Operation timed out, abandoning worker"
            );
            Err(AnalyticsError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}

/// Runs CPU-bound work on the blocking pool.
async fn blocking<T, F>(operation: &'static str, work: F) -> AnalyticsResult<T>
where
    F: FnOnce() -> AnalyticsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!(operation, error = %e, "Blocking worker failed");
        AnalyticsError::ModelFit(format!("{operation} worker failed: {e}"))
    })?
}

/// Converts recoverable sub-model failures into an unavailable slot.
fn absorb<T: Clone>(
    model: &'static str,
    entity_id: &str,
    result: AnalyticsResult<Arc<T>>,
) -> AnalyticsResult<ModelOutcome<T>> {
    match result {
        Ok(value) => Ok(ModelOutcome::Available(value.as_ref().clone())),
        Err(e) if e.is_recoverable() => {
            tracing::warn!(entity = %entity_id, model, error = %e, "Sub-model unavailable");
            Ok(ModelOutcome::unavailable(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

fn validate_entity(entity_id: &str) -> AnalyticsResult<()> {
    if entity_id.trim().is_empty() {
        return Err(AnalyticsError::InvalidParameter("entity id must not be empty".to_string()));
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
