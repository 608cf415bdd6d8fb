//! Aggregator error types.

use std::fmt;

use thiserror::Error;

use crate::source::SourceError;

/// One source's failure, attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from an aggregated search.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregateError {
    /// Every source that answered failed.
    #[error("Couldn't find torrents on any source: {}", join_failures(.0))]
    AllSourcesFailed(Vec<SourceFailure>),

    /// Nothing answered within the grace period; the slow source is still searching.
    #[error("No source answered in time, {source_name} is still searching")]
    Pending { source_name: String },

    #[error("No sources configured")]
    NoSources,

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}
