//! Data access for disclosed-trade analytics.
//!
//! This crate provides:
//! - An in-memory trade-event store with per-entity data versions
//! - CSV loaders and writers for trade events and entity metadata

pub mod csv_storage;
pub mod memory_store;

pub use csv_storage::CsvStorage;
pub use memory_store::InMemoryTradeStore;
