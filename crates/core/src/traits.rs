use crate::events::{DateRange, EntityMetadata, TradeEvent};
use anyhow::Result;
use async_trait::async_trait;

/// Source of disclosed trade events, queryable per entity and date range.
#[async_trait]
pub trait TradeEventStore: Send + Sync {
    /// Returns the entity's events inside `range`, ordered by date.
    async fn events(&self, entity_id: &str, range: DateRange) -> Result<Vec<TradeEvent>>;

    /// Monotonic version of the entity's event history.
    ///
    /// Bumps whenever new events arrive; used as part of every cache key.
    async fn data_version(&self, entity_id: &str) -> Result<u64>;
}

/// Party/family/state metadata lookup used for correlation-edge labeling.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn metadata(&self, entity_id: &str) -> Result<Option<EntityMetadata>>;
}
