//! In-memory trade-event store.
//!
//! Holds events and metadata per entity behind a `tokio::sync::RwLock`.
//! Every append bumps the entity's data version so cached analyses keyed
//! on the old version are never served again.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use disclosure_core::{DateRange, EntityMetadata, MetadataProvider, TradeEvent, TradeEventStore};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct EntityHistory {
    events: Vec<TradeEvent>,
    version: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    entities: HashMap<String, EntityHistory>,
    metadata: HashMap<String, EntityMetadata>,
}

/// Thread-safe in-memory implementation of `TradeEventStore` and `MetadataProvider`.
///
/// Cloning is cheap; clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTradeStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryTradeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from events and metadata in one step.
    pub async fn from_parts(events: Vec<TradeEvent>, metadata: Vec<EntityMetadata>) -> Self {
        let store = Self::new();
        store.append_events(events).await;
        store.upsert_metadata(metadata).await;
        store
    }

    /// Appends events, keeping each entity's history date-ordered.
    ///
    /// Returns the number of entities whose data version changed.
    pub async fn append_events(&self, events: Vec<TradeEvent>) -> usize {
        let mut state = self.state.write().await;
        let mut touched: Vec<String> = Vec::new();

        for event in events {
            let entity_id = event.entity_id.clone();
            state
                .entities
                .entry(entity_id.clone())
                .or_default()
                .events
                .push(event);
            if !touched.contains(&entity_id) {
                touched.push(entity_id);
            }
        }

        for entity_id in &touched {
            if let Some(history) = state.entities.get_mut(entity_id) {
                history.events.sort_by(|a, b| a.date.cmp(&b.date));
                history.version += 1;
            }
        }

        tracing::debug!(entities = touched.len(), "Appended trade events");
        touched.len()
    }

    /// Inserts or replaces metadata records.
    pub async fn upsert_metadata(&self, records: Vec<EntityMetadata>) {
        let mut state = self.state.write().await;
        for record in records {
            state.metadata.insert(record.entity_id.clone(), record);
        }
    }

    /// Returns all entity ids with at least one event, sorted.
    pub async fn entity_ids(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state.entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the date of the latest event across all entities.
    pub async fn latest_date(&self) -> Option<chrono::NaiveDate> {
        let state = self.state.read().await;
        state
            .entities
            .values()
            .filter_map(|h| h.events.last().map(|e| e.date))
            .max()
    }
}

#[async_trait]
impl TradeEventStore for InMemoryTradeStore {
    async fn events(&self, entity_id: &str, range: DateRange) -> Result<Vec<TradeEvent>> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .get(entity_id)
            .map(|h| {
                h.events
                    .iter()
                    .filter(|e| range.contains(e.date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn data_version(&self, entity_id: &str) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.entities.get(entity_id).map_or(0, |h| h.version))
    }
}

#[async_trait]
impl MetadataProvider for InMemoryTradeStore {
    async fn metadata(&self, entity_id: &str) -> Result<Option<EntityMetadata>> {
        let state = self.state.read().await;
        Ok(state.metadata.get(entity_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use disclosure_core::{NotionalRange, TradeDirection};
    use rust_decimal_macros::dec;

    fn event(entity: &str, day: u32) -> TradeEvent {
        TradeEvent::new(
            entity,
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            TradeDirection::Buy,
            NotionalRange::new(dec!(1001), dec!(15000)),
        )
    }

    #[tokio::test]
    async fn events_are_filtered_by_range_and_ordered() {
        let store = InMemoryTradeStore::new();
        store
            .append_events(vec![event("P1", 20), event("P1", 5), event("P1", 12)])
            .await;

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );
        let events = store.events("P1", range).await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].date < events[1].date);
    }

    #[tokio::test]
    async fn unknown_entity_has_no_events_and_version_zero() {
        let store = InMemoryTradeStore::new();
        let range = DateRange::ending_at(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), 31);

        assert!(store.events("nobody", range).await.unwrap().is_empty());
        assert_eq!(store.data_version("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_bumps_only_touched_versions() {
        let store = InMemoryTradeStore::new();
        store.append_events(vec![event("P1", 1), event("P2", 1)]).await;
        let p1_before = store.data_version("P1").await.unwrap();
        let p2_before = store.data_version("P2").await.unwrap();

        let touched = store.append_events(vec![event("P1", 2), event("P1", 3)]).await;

        assert_eq!(touched, 1);
        assert_eq!(store.data_version("P1").await.unwrap(), p1_before + 1);
        assert_eq!(store.data_version("P2").await.unwrap(), p2_before);
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let store = InMemoryTradeStore::from_parts(
            vec![event("P1", 1)],
            vec![EntityMetadata::new("P1", "Jordan Smith").with_party("D")],
        )
        .await;

        let meta = store.metadata("P1").await.unwrap().unwrap();
        assert_eq!(meta.party.as_deref(), Some("D"));
        assert!(store.metadata("P9").await.unwrap().is_none());
        assert_eq!(store.entity_ids().await, vec!["P1".to_string()]);
        assert_eq!(
            store.latest_date().await,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }
}
