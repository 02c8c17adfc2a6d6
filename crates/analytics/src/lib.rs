pub mod analog;
pub mod anomaly;
pub mod cache;
pub mod cyclical;
pub mod ensemble;
pub mod insights;
pub mod network;
pub mod regime;
pub mod service;
pub mod timeseries;

// Re-export model types for convenience
pub use analog::{AnalogAnalysis, AnalogConsensus, AnalogMatcher, HistoricalMatch};
pub use anomaly::{AnomalyFactor, AnomalyFactorKind, AnomalyLevel, AnomalyReport, AnomalyScorer};
pub use cyclical::{
    CycleCategory, CycleForecast, CyclicalAnalysis, CyclicalDetector, CyclicalPattern, ForecastComparison,
};
pub use ensemble::{
    EnsembleCombiner, EnsemblePrediction, ModelContribution, ModelKind, ModelOutcome, ModelOutputs,
    PredictionType,
};
pub use insights::{filter_insights, Insight, InsightContext, InsightGenerator, InsightKind, Severity};
pub use network::{
    best_lagged_correlation, AttributeKind, CentralityScores, CorrelationEdge, CorrelationNetwork,
    EdgeHypothesis, LaggedCorrelation, NetworkAnalyzer, NetworkCluster, NetworkInput, NetworkMetrics,
    SharedAttribute,
};
pub use regime::{RegimeAnalysis, RegimeDetector, RegimeLabel, RegimeSpan, RegimeState};
pub use timeseries::{EntityTimeSeries, TimeSeriesBuilder};

// Re-export the service layer
pub use cache::{AnalysisCache, AnalysisMethod, CacheKey, CacheStats, EntityScope};
pub use service::AnalyticsService;
