//! ibit source: scrapes search and detail pages of a rate-limited site.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::ResultCache;
use crate::config::IbitConfig;
use crate::metrics;

use super::scrape::{parse_search_page, PageOutcome, PageScraper, SkipReason};
use super::{resolve_link, validate_identifier, Source, SourceError, TorrentResult};

/// Name used in logs, metrics and cache keys.
pub const IBIT_SOURCE_NAME: &str = "ibit";

/// Default pause before each detail page request. 100ms still draws some 429s.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(150);

/// Scraping client for ibit.
///
/// The site rate-limits aggressively, so every call (cache hits included)
/// runs under one lock and detail pages are fetched one after another.
pub struct IbitSource {
    base_url: String,
    client: Client,
    cache: Arc<ResultCache>,
    lock: Mutex<()>,
    max_age: Duration,
    page_delay: Duration,
    scraper: PageScraper,
}

impl IbitSource {
    /// Create a new source. `base_url` may point at a proxy.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        cache: Arc<ResultCache>,
        max_age: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache,
            lock: Mutex::new(()),
            max_age,
            page_delay: DEFAULT_PAGE_DELAY,
            scraper: PageScraper::new(),
        })
    }

    /// Create a source from its config section.
    pub fn from_config(
        config: &IbitConfig,
        timeout: Duration,
        cache: Arc<ResultCache>,
        max_age: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self::new(&config.base_url, timeout, cache, max_age)?
            .with_page_delay(Duration::from_millis(config.page_delay_ms)))
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Live search. Expects the lock to be held by the caller.
    async fn search(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
        let url = format!("{}/torrent-search/{}", self.base_url, imdb_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        if response.status() != StatusCode::OK {
            return Err(SourceError::BadStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        let links = parse_search_page(&body);
        if links.rows_without_link > 0 {
            warn!(
                imdb_id = imdb_id,
                rows = links.rows_without_link,
                "Couldn't find link to the torrent page, did the HTML change?"
            );
        }

        // Could be "no torrents" as well as "markup changed". Not cached so the
        // next call looks again.
        if links.hrefs.is_empty() {
            debug!(imdb_id = imdb_id, "No torrent links on the search page");
            metrics::ZERO_LINK_PAGES
                .with_label_values(&[IBIT_SOURCE_NAME])
                .inc();
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for href in &links.hrefs {
            tokio::time::sleep(self.page_delay).await;

            match self.visit_page(href).await {
                PageOutcome::Keep(result) => {
                    trace!(
                        imdb_id = imdb_id,
                        title = %result.title,
                        quality = %result.quality,
                        info_hash = %result.info_hash,
                        "Found torrent"
                    );
                    results.push(result);
                }
                PageOutcome::Skip(reason) => {
                    debug!(
                        imdb_id = imdb_id,
                        href = %href,
                        reason = reason.as_str(),
                        "Skipped torrent page"
                    );
                    metrics::SKIPPED_PAGES
                        .with_label_values(&[IBIT_SOURCE_NAME, reason.as_str()])
                        .inc();
                }
            }
        }

        // Cache even an empty list: that's just the current state of the site.
        self.cache.store_results(imdb_id, IBIT_SOURCE_NAME, &results);

        Ok(results)
    }

    /// Fetch one detail page and turn it into an outcome.
    async fn visit_page(&self, href: &str) -> PageOutcome {
        let url = match resolve_link(href, &self.base_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(href = href, error = %e, "Couldn't route link through the configured base URL");
                return PageOutcome::Skip(SkipReason::BadLink);
            }
        };

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(_) => return PageOutcome::Skip(SkipReason::Request),
        };
        if response.status() != StatusCode::OK {
            return PageOutcome::Skip(SkipReason::BadStatus);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => return PageOutcome::Skip(SkipReason::Request),
        };

        self.scraper.process_page(&body)
    }
}

#[async_trait]
impl Source for IbitSource {
    fn name(&self) -> &str {
        IBIT_SOURCE_NAME
    }

    /// Look up torrents for `imdb_id`.
    ///
    /// No torrents yet for a title is `Ok` with an empty list, not an error.
    async fn check(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
        validate_identifier(imdb_id)?;

        let _guard = self.lock.lock().await;
        let start = Instant::now();

        if let Some(results) = self
            .cache
            .lookup_results(imdb_id, IBIT_SOURCE_NAME, self.max_age)
            .into_hit()
        {
            metrics::observe_source_check(IBIT_SOURCE_NAME, true, start.elapsed());
            return Ok(results);
        }

        let outcome = self.search(imdb_id).await;
        metrics::observe_source_check(IBIT_SOURCE_NAME, outcome.is_ok(), start.elapsed());
        outcome
    }
}
