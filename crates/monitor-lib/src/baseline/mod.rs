//! Baseline model
//!
//! This module provides:
//! - Immutable per-status baseline snapshots computed from minute buckets
//! - Copy-on-refresh publication to concurrent readers
//! - The scheduled refresh task

mod model;
mod refresher;

pub use model::{
    compute_snapshot, BaselineModel, BaselineSettings, BaselineSnapshot, DEFAULT_MIN_SAMPLES,
};
pub use refresher::BaselineRefresher;

pub(crate) use model::mean_and_stddev;
