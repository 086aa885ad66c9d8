//! CLI subcommands

pub mod analyze;
pub mod query;
pub mod simulate;
