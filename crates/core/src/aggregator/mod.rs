//! Federated search over all torrent sources.
//!
//! The aggregator fans a lookup out to every source, tolerates partial
//! failure and merges what comes back:
//! - **Fast sources**: awaited until they answer
//! - **Slow source**: awaited for a grace period only, then left running so
//!   its cache entry is there for the next lookup

mod config;
mod dedup;
mod runner;
mod types;

pub use config::AggregatorConfig;
pub use dedup::dedup_by_info_hash;
pub use runner::Aggregator;
pub use types::{AggregateError, SourceFailure};
