//! Observation storage
//!
//! This module provides:
//! - The bounded in-memory ring buffer used for windowed metrics
//! - The durable store collaborator interface and a JSON-lines implementation
//! - A background worker so persistence never blocks ingestion

mod buffer;
mod durable;
mod worker;

pub use buffer::{ObservationStore, StoreStats, DEFAULT_CAPACITY, DEFAULT_RETENTION_HOURS};
pub use durable::{DurableStore, JsonFileStore};
pub use worker::{PersistCommand, PersistenceHandle, PersistenceWorker, DEFAULT_QUEUE_SIZE};
