//! TTL cache with single flight per key.
//!
//! Keys combine the analysed scope, the analysis method, a hash of the call
//! parameters, and the entity data version. A new trade for an entity bumps
//! its version, so stale entries are never served. Every insert prunes
//! expired slots and slots superseded by the incoming version, then evicts
//! the oldest slots while the cache is at capacity.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// What an analysis covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityScope {
    Entity(String),
    /// Sorted, deduplicated entity list
    Entities(Vec<String>),
}

impl EntityScope {
    /// Normalises an entity list so equal sets share a key.
    #[must_use]
    pub fn entities(ids: &[String]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Self::Entities(ids)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    TimeSeries,
    Cyclical,
    Regime,
    Analog,
    Ensemble,
    Network,
    Anomaly,
    Insights,
}

impl AnalysisMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::Cyclical => "cyclical",
            Self::Regime => "regime",
            Self::Analog => "analog",
            Self::Ensemble => "ensemble",
            Self::Network => "network",
            Self::Anomaly => "anomaly",
            Self::Insights => "insights",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: EntityScope,
    pub method: AnalysisMethod,
    pub params_hash: u64,
    pub data_version: u64,
}

impl CacheKey {
    #[must_use]
    pub fn new(scope: EntityScope, method: AnalysisMethod) -> Self {
        Self {
            scope,
            method,
            params_hash: 0,
            data_version: 0,
        }
    }

    #[must_use]
    pub fn entity(entity_id: &str, method: AnalysisMethod) -> Self {
        Self::new(EntityScope::Entity(entity_id.to_string()), method)
    }

    /// Hashes the call parameters into the key.
    #[must_use]
    pub fn with_params<P: Hash + ?Sized>(mut self, params: &P) -> Self {
        let mut hasher = DefaultHasher::new();
        params.hash(&mut hasher);
        self.params_hash = hasher.finish();
        self
    }

    #[must_use]
    pub const fn with_version(mut self, data_version: u64) -> Self {
        self.data_version = data_version;
        self
    }

    /// True when `other` is the same analysis over older data.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.method == other.method
            && self.params_hash == other.params_hash
            && self.scope == other.scope
            && other.data_version < self.data_version
    }
}

/// Default slot limit per cache.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Slot<V> {
    cell: Arc<OnceCell<V>>,
    created: Instant,
}

/// Per-method result cache.
///
/// Values are cloned out, so `V` is usually an `Arc`.
pub struct AnalysisCache<V> {
    name: &'static str,
    ttl: Duration,
    max_entries: usize,
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> AnalysisCache<V> {
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Caps the number of slots; at least one slot is always kept.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key` without computing.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let slots = self.slots.lock();
        slots
            .get(key)
            .filter(|slot| slot.created.elapsed() < self.ttl)
            .and_then(|slot| slot.cell.get().cloned())
    }

    /// Returns the cached value or runs `compute` exactly once per live key.
    ///
    /// Concurrent callers for the same key wait on the first caller's
    /// computation. A failed computation leaves the slot empty so the next
    /// caller retries.
    ///
    /// # Errors
    /// Returns whatever `compute` returns.
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(slot) if slot.created.elapsed() < self.ttl => Arc::clone(&slot.cell),
                _ => {
                    self.make_room(&mut slots, &key);
                    let cell = Arc::new(OnceCell::new());
                    slots.insert(
                        key.clone(),
                        Slot {
                            cell: Arc::clone(&cell),
                            created: Instant::now(),
                        },
                    );
                    cell
                }
            }
        };

        if let Some(value) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(cache = self.name, method = key.method.as_str(), "Cache hit");
            return Ok(value.clone());
        }

        let mut computed = false;
        let value = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?;
        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value.clone())
    }

    fn make_room(&self, slots: &mut HashMap<CacheKey, Slot<V>>, incoming: &CacheKey) {
        let before = slots.len();
        slots.retain(|key, slot| slot.created.elapsed() < self.ttl && !incoming.supersedes(key));
        let pruned = before - slots.len();

        let mut evicted = 0;
        while slots.len() >= self.max_entries {
            let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.created)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            slots.remove(&oldest);
            evicted += 1;
        }

        if pruned + evicted > 0 {
            tracing::debug!(cache = self.name, pruned, evicted, "Made room for new entry");
        }
    }

    /// Drops every entry whose scope mentions `entity_id`.
    pub fn invalidate_entity(&self, entity_id: &str) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| match &key.scope {
            EntityScope::Entity(id) => id != entity_id,
            EntityScope::Entities(ids) => !ids.iter().any(|id| id == entity_id),
        });
        before - slots.len()
    }

    /// Removes expired entries.
    pub fn purge_expired(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.created.elapsed() < self.ttl);
        let removed = before - slots.len();
        if removed > 0 {
            tracing::debug!(cache = self.name, removed, "Purged expired entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.slots.lock().len(),
        }
    }
}

impl<V> std::fmt::Debug for AnalysisCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("entries", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}
