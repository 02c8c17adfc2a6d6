//! Core types, errors, configuration, and collaborator traits for
//! disclosed-trade analytics.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod stats;
pub mod traits;

pub use config::{
    AnalogConfig, AnalyticsConfig, AnomalyConfig, CacheConfig, CyclicalConfig, EnsembleConfig,
    InsightConfig, NetworkConfig, RegimeConfig, RuntimeConfig, TimeSeriesConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{AnalyticsError, AnalyticsResult};
pub use events::{DateRange, EntityMetadata, NotionalRange, TradeDirection, TradeEvent};
pub use traits::{MetadataProvider, TradeEventStore};
