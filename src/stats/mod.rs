//! Stats tracking for Shelve.
//!
//! Decision cycles are recorded in an append-only JSONL event log
//! (`.shelve/stats.log`). The summary is rebuilt from the log on read.

pub mod summary;
pub mod tracker;

pub use summary::StatsSummary;
pub use tracker::{StatsEvent, StatsEventType, StatsLogger, STATS_SCHEMA_VERSION};
