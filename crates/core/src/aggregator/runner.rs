//! Fan-out/fan-in over all configured sources.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::Config;
use crate::metrics;
use crate::source::{IbitSource, Source, SourceError, TorrentResult, YtsSource};

use super::dedup::dedup_by_info_hash;
use super::{AggregateError, AggregatorConfig, SourceFailure};

type CheckOutcome = Result<Vec<TorrentResult>, SourceError>;

/// Queries every source for an identifier and merges what they found.
///
/// Fast sources are awaited until they answer (their HTTP clients carry a
/// timeout). The slow source gets a grace period on top; if it hasn't answered
/// by then it keeps running in the background and fills the cache for the
/// next call.
pub struct Aggregator {
    fast: Vec<Arc<dyn Source>>,
    slow: Option<Arc<dyn Source>>,
    sources: HashMap<String, Arc<dyn Source>>,
    config: AggregatorConfig,
    /// Slow checks that outlived their grace period, by identifier.
    background: Mutex<Vec<(String, JoinHandle<CheckOutcome>)>>,
}

impl Aggregator {
    pub fn new(
        fast: Vec<Arc<dyn Source>>,
        slow: Option<Arc<dyn Source>>,
        config: AggregatorConfig,
    ) -> Self {
        let sources = fast
            .iter()
            .chain(slow.iter())
            .map(|source| (source.name().to_string(), Arc::clone(source)))
            .collect();

        Self {
            fast,
            slow,
            sources,
            config,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Build the configured sources: YTS as a fast source, ibit as the slow one.
    pub fn from_config(config: &Config, cache: Arc<ResultCache>) -> Result<Self, SourceError> {
        let timeout = config.sources.timeout();
        let max_age = config.cache.max_age();

        let mut fast: Vec<Arc<dyn Source>> = Vec::new();
        if config.sources.yts.enabled {
            fast.push(Arc::new(YtsSource::from_config(
                &config.sources.yts,
                timeout,
                Arc::clone(&cache),
                max_age,
            )?));
        }

        let slow: Option<Arc<dyn Source>> = if config.sources.ibit.enabled {
            Some(Arc::new(IbitSource::from_config(
                &config.sources.ibit,
                timeout,
                Arc::clone(&cache),
                max_age,
            )?))
        } else {
            None
        };

        Ok(Self::new(
            fast,
            slow,
            AggregatorConfig::from(&config.aggregator),
        ))
    }

    /// Every source by name, for querying a single one directly.
    pub fn sources(&self) -> &HashMap<String, Arc<dyn Source>> {
        &self.sources
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Number of background checks that haven't finished yet.
    pub async fn background_count(&self) -> usize {
        let background = self.background.lock().await;
        background.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Wait for every check left running in the background by `find_results`.
    ///
    /// Only awaits tasks already running, it never queries a source itself.
    /// Returns how many checks were waited for.
    pub async fn settle_background(&self) -> usize {
        let pending = std::mem::take(&mut *self.background.lock().await);
        let count = pending.len();
        for (imdb_id, handle) in pending {
            match flatten(handle.await) {
                Ok(results) => info!(
                    imdb_id = %imdb_id,
                    torrent_count = results.len(),
                    "Background search finished"
                ),
                Err(e) => warn!(imdb_id = %imdb_id, error = %e, "Background search failed"),
            }
        }
        count
    }

    /// Find torrents for `imdb_id` on all sources.
    ///
    /// Fails only if every source that answered failed. An empty list means
    /// the sources were reachable but had nothing.
    pub async fn find_results(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, AggregateError> {
        if imdb_id.trim().is_empty() {
            return Err(AggregateError::InvalidIdentifier(imdb_id.to_string()));
        }
        if self.fast.is_empty() && self.slow.is_none() {
            return Err(AggregateError::NoSources);
        }

        let attempts = self.config.attempts();

        let mut fast: FuturesUnordered<_> = self
            .fast
            .iter()
            .map(|source| {
                let name = source.name().to_string();
                let handle = spawn_check(Arc::clone(source), imdb_id, attempts);
                async move { (name, handle.await) }
            })
            .collect();

        // Started right away so it gets the whole fast phase plus the grace period.
        let slow = self.slow.as_ref().map(|source| {
            (
                source.name().to_string(),
                spawn_check(Arc::clone(source), imdb_id, attempts),
            )
        });

        let mut merge = Merge::default();
        while let Some((name, joined)) = fast.next().await {
            merge.add(name, flatten(joined));
        }

        let mut still_running = None;
        if let Some((name, mut handle)) = slow {
            match tokio::time::timeout(self.config.grace_period, &mut handle).await {
                Ok(joined) => merge.add(name, flatten(joined)),
                Err(_) => {
                    info!(
                        imdb_id = imdb_id,
                        source = %name,
                        "Torrent search hasn't finished yet, letting it run in the background"
                    );
                    metrics::SLOW_SOURCE_DETACHED
                        .with_label_values(&[name.as_str()])
                        .inc();
                    // Kept so callers can wait for it; the task is never cancelled.
                    let mut background = self.background.lock().await;
                    background.retain(|(_, h)| !h.is_finished());
                    background.push((imdb_id.to_string(), handle));
                    still_running = Some(name);
                }
            }
        }

        merge.finish(imdb_id, still_running)
    }
}

/// Run one source check on its own task.
///
/// The task logs its own outcome so a detached slow check still reports.
fn spawn_check(source: Arc<dyn Source>, imdb_id: &str, attempts: u32) -> JoinHandle<CheckOutcome> {
    let imdb_id = imdb_id.to_string();
    tokio::spawn(async move {
        let name = source.name();
        debug!(imdb_id = %imdb_id, source = name, "Started searching torrents");

        let outcome = if source.supports_retries() {
            source.check_with_attempts(&imdb_id, attempts).await
        } else {
            source.check(&imdb_id).await
        };

        match &outcome {
            Ok(results) => debug!(
                imdb_id = %imdb_id,
                source = name,
                torrent_count = results.len(),
                "Found torrents"
            ),
            Err(e) => warn!(
                imdb_id = %imdb_id,
                source = name,
                error = %e,
                "Couldn't find torrents"
            ),
        }
        outcome
    })
}

/// A task that panicked or was aborted counts as that source failing.
fn flatten(joined: Result<CheckOutcome, JoinError>) -> CheckOutcome {
    joined.unwrap_or_else(|e| Err(SourceError::Internal(format!("Source task failed: {}", e))))
}

/// Accumulates source outcomes in the order they arrive.
#[derive(Default)]
struct Merge {
    results: Vec<TorrentResult>,
    failures: Vec<SourceFailure>,
    answered: usize,
    non_empty: usize,
}

impl Merge {
    fn add(&mut self, source: String, outcome: CheckOutcome) {
        self.answered += 1;
        match outcome {
            Ok(results) => {
                if !results.is_empty() {
                    self.non_empty += 1;
                }
                self.results.extend(results);
            }
            Err(error) => self.failures.push(SourceFailure { source, error }),
        }
    }

    fn finish(
        self,
        imdb_id: &str,
        still_running: Option<String>,
    ) -> Result<Vec<TorrentResult>, AggregateError> {
        if self.answered == 0 {
            if let Some(source_name) = still_running {
                metrics::AGGREGATE_REQUESTS
                    .with_label_values(&["pending"])
                    .inc();
                return Err(AggregateError::Pending { source_name });
            }
        }

        if self.failures.len() == self.answered {
            metrics::AGGREGATE_REQUESTS
                .with_label_values(&["failed"])
                .inc();
            return Err(AggregateError::AllSourcesFailed(self.failures));
        }

        // Duplicates are only possible with results from more than one source.
        let results = if self.non_empty > 1 {
            dedup_by_info_hash(self.results)
        } else {
            self.results
        };

        if results.is_empty() {
            warn!(imdb_id = imdb_id, "Couldn't find ANY torrents");
            metrics::AGGREGATE_REQUESTS.with_label_values(&["empty"]).inc();
        } else {
            metrics::AGGREGATE_REQUESTS.with_label_values(&["found"]).inc();
        }
        metrics::AGGREGATE_RESULTS.observe(results.len() as f64);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockSource};
    use async_trait::async_trait;
    use std::time::{Duration, Instant};

    fn config(grace_ms: u64) -> AggregatorConfig {
        AggregatorConfig {
            grace_period: Duration::from_millis(grace_ms),
            retries: 1,
        }
    }

    fn arc(source: &Arc<MockSource>) -> Arc<dyn Source> {
        Arc::clone(source) as Arc<dyn Source>
    }

    struct PanickingSource;

    #[async_trait]
    impl Source for PanickingSource {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn check(&self, _imdb_id: &str) -> CheckOutcome {
            panic!("source blew up");
        }
    }

    #[tokio::test]
    async fn test_merges_and_dedups() {
        let a = Arc::new(MockSource::new("a").with_results(vec![
            fixtures::torrent_result("A1", "720p", "AAAA"),
            fixtures::torrent_result("Shared", "1080p", "CCCC"),
        ]));
        let b = Arc::new(MockSource::new("b").with_results(vec![
            fixtures::torrent_result("Shared too", "1080p", "CCCC"),
            fixtures::torrent_result("B1", "2160p", "BBBB"),
        ]));
        let aggregator = Aggregator::new(vec![arc(&a), arc(&b)], None, config(100));

        let results = aggregator.find_results("tt1").await.unwrap();
        let mut hashes: Vec<_> = results.iter().map(|r| r.info_hash.as_str()).collect();
        hashes.sort();
        assert_eq!(hashes, vec!["AAAA", "BBBB", "CCCC"]);
    }

    #[tokio::test]
    async fn test_single_non_empty_source_is_unchanged() {
        // Duplicates within one source are left alone.
        let list = vec![
            fixtures::torrent_result("Z", "720p", "ZZZZ"),
            fixtures::torrent_result("A", "1080p", "AAAA"),
            fixtures::torrent_result("Z again", "2160p", "ZZZZ"),
        ];
        let full = Arc::new(MockSource::new("full").with_results(list.clone()));
        let empty = Arc::new(MockSource::new("empty"));
        let failing = Arc::new(MockSource::new("failing").with_error(SourceError::Timeout));
        let slow_empty = Arc::new(MockSource::new("slow"));

        let aggregator = Aggregator::new(
            vec![arc(&empty), arc(&full), arc(&failing)],
            Some(arc(&slow_empty)),
            config(500),
        );

        assert_eq!(aggregator.find_results("tt1").await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_all_sources_failed_lists_every_source() {
        let a = Arc::new(MockSource::new("a").with_error(SourceError::Timeout));
        let b = Arc::new(MockSource::new("b").with_error(SourceError::Parse("bad json".into())));
        let slow = Arc::new(MockSource::new("slow").with_error(SourceError::BadStatus {
            url: "http://x".into(),
            status: 429,
        }));
        let aggregator = Aggregator::new(vec![arc(&a), arc(&b)], Some(arc(&slow)), config(500));

        let err = aggregator.find_results("tt1").await.unwrap_err();
        let AggregateError::AllSourcesFailed(failures) = &err else {
            panic!("expected AllSourcesFailed, got {:?}", err);
        };
        assert_eq!(failures.len(), 3);

        let message = err.to_string();
        assert!(message.starts_with("Couldn't find torrents on any source: "));
        assert_eq!(message.matches("; ").count(), 2);
        for segment in ["a: Request timeout", "b: Couldn't parse response: bad json", "slow: Bad GET"] {
            assert!(message.contains(segment), "missing {:?} in {}", segment, message);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_returns_results() {
        let ok = Arc::new(
            MockSource::new("ok").with_results(vec![fixtures::torrent_result("A", "720p", "AAAA")]),
        );
        let broken = Arc::new(MockSource::new("broken").with_error(SourceError::Timeout));
        let aggregator = Aggregator::new(vec![arc(&ok), arc(&broken)], None, config(100));

        assert_eq!(aggregator.find_results("tt1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_everywhere_is_ok() {
        let a = Arc::new(MockSource::new("a"));
        let b = Arc::new(MockSource::new("b"));
        let aggregator = Aggregator::new(vec![arc(&a)], Some(arc(&b)), config(500));

        assert!(aggregator.find_results("tt1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_source_within_grace_is_included() {
        let fast = Arc::new(
            MockSource::new("fast").with_results(vec![fixtures::torrent_result("F", "720p", "FFFF")]),
        );
        let slow = Arc::new(
            MockSource::new("slow")
                .with_results(vec![fixtures::torrent_result("S", "1080p", "SSSS")])
                .with_delay(Duration::from_millis(50)),
        );
        let aggregator = Aggregator::new(vec![arc(&fast)], Some(arc(&slow)), config(2000));

        let results = aggregator.find_results("tt1").await.unwrap();
        assert_eq!(results.len(), 2);
        // Slow results come after every fast result.
        assert_eq!(results[0].info_hash, "FFFF");
        assert_eq!(results[1].info_hash, "SSSS");
    }

    #[tokio::test]
    async fn test_slow_source_over_grace_runs_in_background() {
        let cache = Arc::new(ResultCache::new(1024 * 1024));
        let fast = Arc::new(
            MockSource::new("fast")
                .with_results(vec![fixtures::torrent_result("F", "720p", "FFFF")])
                .with_delay(Duration::from_millis(50)),
        );
        let slow = Arc::new(
            MockSource::new("slow")
                .with_results(vec![fixtures::torrent_result("S", "1080p", "SSSS")])
                .with_delay(Duration::from_millis(600))
                .with_cache(Arc::clone(&cache), Duration::from_secs(60)),
        );
        let aggregator = Aggregator::new(vec![arc(&fast)], Some(arc(&slow)), config(100));

        let start = Instant::now();
        let results = aggregator.find_results("tt1").await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].info_hash, "FFFF");
        assert!(elapsed >= Duration::from_millis(150), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "returned after {:?}", elapsed);

        // The detached check finishes and fills the cache.
        let deadline = Instant::now() + Duration::from_secs(5);
        while slow.completed_count() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(slow.completed_count(), 1);
        assert!(cache.contains(b"tt1-slow"));

        // The next call is served from that cache entry within the grace period.
        let results = aggregator.find_results("tt1").await.unwrap();
        let hashes: Vec<_> = results.iter().map(|r| r.info_hash.as_str()).collect();
        assert_eq!(hashes, vec!["FFFF", "SSSS"]);
    }

    #[tokio::test]
    async fn test_only_slow_source_timing_out_is_pending() {
        let slow = Arc::new(MockSource::new("slow").with_delay(Duration::from_millis(500)));
        let aggregator = Aggregator::new(vec![], Some(arc(&slow)), config(50));

        assert_eq!(
            aggregator.find_results("tt1").await,
            Err(AggregateError::Pending {
                source_name: "slow".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_fast_failures_with_slow_timing_out_fail() {
        let fast = Arc::new(MockSource::new("fast").with_error(SourceError::Timeout));
        let slow = Arc::new(MockSource::new("slow").with_delay(Duration::from_millis(500)));
        let aggregator = Aggregator::new(vec![arc(&fast)], Some(arc(&slow)), config(50));

        let err = aggregator.find_results("tt1").await.unwrap_err();
        assert!(matches!(err, AggregateError::AllSourcesFailed(ref f) if f.len() == 1));
    }

    #[tokio::test]
    async fn test_retries_only_for_retry_capable_sources() {
        let retrying = Arc::new(MockSource::new("retrying").with_retries());
        let plain = Arc::new(MockSource::new("plain"));
        let aggregator = Aggregator::new(
            vec![arc(&retrying), arc(&plain)],
            None,
            AggregatorConfig {
                grace_period: Duration::from_millis(100),
                retries: 2,
            },
        );

        aggregator.find_results("tt1").await.unwrap();

        assert_eq!(retrying.recorded_checks().await[0].attempts, 3);
        assert_eq!(plain.recorded_checks().await[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_panicking_source_counts_as_failure() {
        let aggregator = Aggregator::new(
            vec![Arc::new(PanickingSource) as Arc<dyn Source>],
            None,
            config(100),
        );

        let err = aggregator.find_results("tt1").await.unwrap_err();
        let AggregateError::AllSourcesFailed(failures) = err else {
            panic!("expected AllSourcesFailed");
        };
        assert_eq!(failures[0].source, "panicky");
        assert!(matches!(failures[0].error, SourceError::Internal(_)));
    }

    #[tokio::test]
    async fn test_invalid_identifier_and_no_sources() {
        let a = Arc::new(MockSource::new("a"));
        let aggregator = Aggregator::new(vec![arc(&a)], None, config(100));
        assert!(matches!(
            aggregator.find_results("").await,
            Err(AggregateError::InvalidIdentifier(_))
        ));
        assert_eq!(a.check_count().await, 0);

        let empty = Aggregator::new(vec![], None, config(100));
        assert_eq!(
            empty.find_results("tt1").await,
            Err(AggregateError::NoSources)
        );
    }

    #[tokio::test]
    async fn test_sources_map() {
        let a = Arc::new(MockSource::new("a"));
        let slow = Arc::new(MockSource::new("slow"));
        let aggregator = Aggregator::new(vec![arc(&a)], Some(arc(&slow)), config(100));

        let sources = aggregator.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources["a"].name(), "a");
        assert_eq!(sources["slow"].name(), "slow");
    }

    #[tokio::test]
    async fn test_settle_background_waits_for_detached_check() {
        let fast = Arc::new(MockSource::new("fast"));
        let slow = Arc::new(
            MockSource::new("slow")
                .with_results(vec![fixtures::torrent_result("S", "1080p", "SSSS")])
                .with_delay(Duration::from_millis(300)),
        );
        let aggregator = Aggregator::new(vec![arc(&fast)], Some(arc(&slow)), config(50));

        aggregator.find_results("tt1").await.unwrap();
        assert_eq!(aggregator.background_count().await, 1);
        assert_eq!(slow.completed_count(), 0);

        assert_eq!(aggregator.settle_background().await, 1);
        assert_eq!(slow.completed_count(), 1);
        assert_eq!(slow.check_count().await, 1);
        assert_eq!(aggregator.background_count().await, 0);

        // Nothing left to wait for.
        assert_eq!(aggregator.settle_background().await, 0);
        assert_eq!(slow.check_count().await, 1);
    }

    #[tokio::test]
    async fn test_settle_background_without_detached_checks_queries_nothing() {
        let fast = Arc::new(MockSource::new("fast"));
        let slow = Arc::new(MockSource::new("slow").with_error(SourceError::Timeout));
        let aggregator = Aggregator::new(vec![arc(&fast)], Some(arc(&slow)), config(500));

        assert_eq!(aggregator.settle_background().await, 0);
        assert_eq!(slow.check_count().await, 0);

        // Answered within the grace period: nothing is left running.
        aggregator.find_results("tt1").await.unwrap();
        assert_eq!(aggregator.settle_background().await, 0);
        assert_eq!(slow.check_count().await, 1);
    }

    #[test]
    fn test_from_config_skips_disabled_sources() {
        let cache = Arc::new(ResultCache::new(1024 * 1024));
        let mut config = Config::default();
        config.sources.ibit.enabled = false;
        let aggregator = Aggregator::from_config(&config, cache).unwrap();

        assert_eq!(aggregator.fast.len(), 1);
        assert!(aggregator.slow.is_none());
        assert_eq!(aggregator.sources().len(), 1);
    }

    #[test]
    fn test_from_config() {
        let cache = Arc::new(ResultCache::new(1024 * 1024));
        let aggregator = Aggregator::from_config(&Config::default(), cache).unwrap();

        assert_eq!(aggregator.fast.len(), 1);
        assert_eq!(aggregator.fast[0].name(), "YTS");
        assert_eq!(aggregator.slow.as_ref().map(|s| s.name()), Some("ibit"));
        assert!(aggregator.fast[0].supports_retries());
        assert_eq!(aggregator.config().grace_period, Duration::from_secs(1));
    }
}
