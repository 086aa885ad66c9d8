//! Transaction monitor server
//!
//! HTTP ingestion and query surface, configuration and startup restoration
//! around the `monitor-lib` detection engine.

pub mod api;
pub mod bootstrap;
pub mod config;
