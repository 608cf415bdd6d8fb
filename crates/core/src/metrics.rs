//! Prometheus metrics for the search engine.
//!
//! This module provides metrics for:
//! - Sources (requests, durations, skipped pages)
//! - The result cache (lookups by outcome)
//! - The aggregator (result counts, slow-source detaches)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Source Metrics
// =============================================================================

/// Source requests total by result.
pub static SOURCE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("torrentfed_source_requests_total", "Total source checks"),
        &["source", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Source check duration in seconds.
pub static SOURCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "torrentfed_source_duration_seconds",
            "Duration of source checks, cache hits included",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

/// Search pages that contained no torrent links.
///
/// Either the identifier is unknown upstream or the markup changed, the page
/// alone can't tell which.
pub static ZERO_LINK_PAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "torrentfed_zero_link_pages_total",
            "Search result pages without any torrent link",
        ),
        &["source"],
    )
    .unwrap()
});

/// Detail pages skipped by reason.
pub static SKIPPED_PAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "torrentfed_skipped_pages_total",
            "Torrent detail pages that produced no result",
        ),
        &["source", "reason"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Cache lookups by outcome.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("torrentfed_cache_lookups_total", "Total result cache lookups"),
        &["source", "outcome"], // outcome: "hit", "expired", "corrupt", "miss"
    )
    .unwrap()
});

// =============================================================================
// Aggregator Metrics
// =============================================================================

/// Aggregated searches by outcome.
pub static AGGREGATE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "torrentfed_aggregate_requests_total",
            "Total aggregated searches",
        ),
        &["result"], // "found", "empty", "failed", "pending"
    )
    .unwrap()
});

/// Results returned per aggregated search.
pub static AGGREGATE_RESULTS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "torrentfed_aggregate_results",
            "Number of results returned per aggregated search",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
    )
    .unwrap()
});

/// Slow sources left running in the background after the grace period.
pub static SLOW_SOURCE_DETACHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "torrentfed_slow_source_detached_total",
            "Slow source checks that outlived the grace period",
        ),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Sources
        Box::new(SOURCE_REQUESTS.clone()),
        Box::new(SOURCE_DURATION.clone()),
        Box::new(ZERO_LINK_PAGES.clone()),
        Box::new(SKIPPED_PAGES.clone()),
        // Cache
        Box::new(CACHE_LOOKUPS.clone()),
        // Aggregator
        Box::new(AGGREGATE_REQUESTS.clone()),
        Box::new(AGGREGATE_RESULTS.clone()),
        Box::new(SLOW_SOURCE_DETACHED.clone()),
    ]
}

/// Record the outcome and duration of one source check.
pub fn observe_source_check(source: &str, success: bool, elapsed: std::time::Duration) {
    let status = if success { "success" } else { "error" };
    SOURCE_REQUESTS.with_label_values(&[source, status]).inc();
    SOURCE_DURATION
        .with_label_values(&[source])
        .observe(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }

    #[test]
    fn test_observe_source_check() {
        let before = SOURCE_REQUESTS
            .with_label_values(&["metrics-test", "error"])
            .get();
        observe_source_check("metrics-test", false, std::time::Duration::from_millis(5));
        assert_eq!(
            SOURCE_REQUESTS
                .with_label_values(&["metrics-test", "error"])
                .get(),
            before + 1
        );
    }
}
