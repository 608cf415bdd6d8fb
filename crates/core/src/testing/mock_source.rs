//! Mock source for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::cache::ResultCache;
use crate::source::{validate_identifier, Source, SourceError, TorrentResult};

/// A recorded check for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCheck {
    /// The identifier that was checked.
    pub imdb_id: String,
    /// Attempts the caller allowed.
    pub attempts: u32,
}

/// Mock implementation of the Source trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable results
/// - Track checks for assertions
/// - Simulate failures, slowness and retry support
/// - Optionally read and fill a shared `ResultCache` like a real source
///
/// # Example
///
/// ```rust,ignore
/// use torrentfed_core::testing::{MockSource, fixtures};
///
/// let source = MockSource::new("fast").with_results(vec![
///     fixtures::torrent_result("Movie", "1080p", "AAAA"),
/// ]);
///
/// let results = source.check("tt0111161").await?;
/// assert_eq!(results.len(), 1);
/// assert_eq!(source.check_count().await, 1);
/// ```
pub struct MockSource {
    name: String,
    /// Configured results to return.
    results: Arc<RwLock<Vec<TorrentResult>>>,
    /// Recorded checks.
    checks: Arc<RwLock<Vec<RecordedCheck>>>,
    /// If set, the next attempt will fail with this error.
    next_error: Arc<RwLock<Option<SourceError>>>,
    /// If set, every attempt fails with this error.
    error: Arc<RwLock<Option<SourceError>>>,
    /// Simulated latency of a live lookup.
    delay: Arc<RwLock<Option<Duration>>>,
    supports_retries: bool,
    cache: Option<(Arc<ResultCache>, Duration)>,
    /// Checks that ran to the end, cache hits included.
    completed: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("name", &self.name)
            .field("supports_retries", &self.supports_retries)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl MockSource {
    /// Create a new mock source with empty results.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Arc::new(RwLock::new(Vec::new())),
            checks: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            supports_retries: false,
            cache: None,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return these results.
    pub fn with_results(mut self, results: Vec<TorrentResult>) -> Self {
        self.results = Arc::new(RwLock::new(results));
        self
    }

    /// Fail every attempt with this error.
    pub fn with_error(mut self, error: SourceError) -> Self {
        self.error = Arc::new(RwLock::new(Some(error)));
        self
    }

    /// Take this long for every live lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Arc::new(RwLock::new(Some(delay)));
        self
    }

    /// Honor the attempt count passed to `check_with_attempts`.
    pub fn with_retries(mut self) -> Self {
        self.supports_retries = true;
        self
    }

    /// Read and fill `cache` under this source's name.
    pub fn with_cache(mut self, cache: Arc<ResultCache>, max_age: Duration) -> Self {
        self.cache = Some((cache, max_age));
        self
    }

    /// Set the results to return for subsequent checks.
    pub async fn set_results(&self, results: Vec<TorrentResult>) {
        *self.results.write().await = results;
    }

    /// Configure the next attempt to fail with the given error.
    pub async fn set_next_error(&self, error: SourceError) {
        *self.next_error.write().await = Some(error);
    }

    /// Configure every attempt to fail, or stop failing with `None`.
    pub async fn set_error(&self, error: Option<SourceError>) {
        *self.error.write().await = error;
    }

    /// Get recorded checks.
    pub async fn recorded_checks(&self) -> Vec<RecordedCheck> {
        self.checks.read().await.clone()
    }

    /// Get the number of checks started.
    pub async fn check_count(&self) -> usize {
        self.checks.read().await.len()
    }

    /// Number of checks that ran to completion.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn attempt(&self) -> Result<Vec<TorrentResult>, SourceError> {
        if let Some(err) = self.error.read().await.clone() {
            return Err(err);
        }
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.results.read().await.clone())
    }

    async fn run(&self, imdb_id: &str, attempts: u32) -> Result<Vec<TorrentResult>, SourceError> {
        self.checks.write().await.push(RecordedCheck {
            imdb_id: imdb_id.to_string(),
            attempts,
        });
        validate_identifier(imdb_id)?;

        if let Some((cache, max_age)) = &self.cache {
            if let Some(results) = cache
                .lookup_results(imdb_id, &self.name, *max_age)
                .into_hit()
            {
                self.completed.fetch_add(1, Ordering::SeqCst);
                return Ok(results);
            }
        }

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut outcome = self.attempt().await;
        for _ in 1..attempts.max(1) {
            if outcome.is_ok() {
                break;
            }
            outcome = self.attempt().await;
        }

        if let (Ok(results), Some((cache, _))) = (&outcome, &self.cache) {
            cache.store_results(imdb_id, &self.name, results);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

#[async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
        self.run(imdb_id, 1).await
    }

    fn supports_retries(&self) -> bool {
        self.supports_retries
    }

    async fn check_with_attempts(
        &self,
        imdb_id: &str,
        attempts: u32,
    ) -> Result<Vec<TorrentResult>, SourceError> {
        if self.supports_retries {
            self.run(imdb_id, attempts).await
        } else {
            self.run(imdb_id, 1).await
        }
    }
}
