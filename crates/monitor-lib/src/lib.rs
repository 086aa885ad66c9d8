//! Transaction monitor library
//!
//! This crate provides the core functionality for:
//! - Recording per-minute transaction status counts in a bounded ring buffer
//! - Windowed failure-rate aggregation and historical baselines
//! - Hybrid rule + statistical anomaly scoring with alert deduplication
//! - Durable persistence and notification handoff
//! - Health checks and observability

pub mod aggregator;
pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod notify;
pub mod observability;
pub mod reporting;
pub mod store;

pub use config::{DetectorConfig, RuleThreshold};
pub use engine::{DetectionEngine, Evaluation, IngestOutcome};
pub use error::MonitorError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
