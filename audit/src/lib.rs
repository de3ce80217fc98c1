//! Change-capture and audit pipeline for relational databases.
//!
//! The crate attaches to a database's ordered change stream, filters events
//! against a hot-swappable registry of monitored tables, normalizes row
//! mutations into diffed and masked change records, persists them durably
//! with resumable checkpointing, and feeds them to rule-based alerting and
//! a pattern-based SQL risk analyzer.
//!
//! Delivery is at-least-once: on restart the stream replays from the last
//! checkpoint and the [`store`] deduplicates by stream position.

pub mod concurrency;
pub mod conversions;
pub mod error;
mod macros;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod risk;
pub mod rules;
pub mod state;
pub mod store;
pub mod stream;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
pub mod workers;
