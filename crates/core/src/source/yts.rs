//! YTS source: JSON API with per-torrent quality fields.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::YtsConfig;
use crate::metrics;

use super::extract::canonical_hash;
use super::quality::resolution_from_field;
use super::{validate_identifier, Source, SourceError, TorrentResult};

/// Name used in logs, metrics and cache keys.
pub const YTS_SOURCE_NAME: &str = "YTS";

/// Trackers added to every magnet we build.
const TRACKERS: &[&str] = &[
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.openbittorrent.com:80",
    "udp://tracker.coppersurfer.tk:6969",
    "udp://glotorrents.pw:6969/announce",
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://torrent.gresille.org:80/announce",
    "udp://p4p.arenabg.com:1337",
    "udp://tracker.leechers-paradise.org:6969",
];

/// YTS API client.
pub struct YtsSource {
    base_url: String,
    client: Client,
    cache: Arc<ResultCache>,
    max_age: Duration,
}

impl YtsSource {
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
            max_age,
        })
    }

    pub fn from_config(
        config: &YtsConfig,
        timeout: Duration,
        cache: Arc<ResultCache>,
        max_age: Duration,
    ) -> Result<Self, SourceError> {
        Self::new(&config.base_url, timeout, cache, max_age)
    }

    /// Build the list endpoint URL for an identifier.
    fn build_search_url(&self, imdb_id: &str) -> String {
        format!(
            "{}/api/v2/list_movies.json?query_term={}",
            self.base_url,
            urlencoding::encode(imdb_id)
        )
    }

    /// One live request.
    async fn fetch(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
        let url = self.build_search_url(imdb_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        if !response.status().is_success() {
            return Err(SourceError::BadStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        let body: YtsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Invalid YTS response: {}", e)))?;

        parse_response(body)
    }
}

#[derive(Debug, Deserialize)]
struct YtsResponse {
    status: String,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    data: Option<YtsData>,
}

#[derive(Debug, Deserialize)]
struct YtsData {
    #[serde(default)]
    movie_count: u32,
    #[serde(default)]
    movies: Option<Vec<YtsMovie>>,
}

#[derive(Debug, Deserialize)]
struct YtsMovie {
    title_long: String,
    #[serde(default)]
    torrents: Vec<YtsTorrent>,
}

#[derive(Debug, Deserialize)]
struct YtsTorrent {
    hash: String,
    quality: String,
    #[serde(default)]
    bit_depth: Option<String>,
}

fn parse_response(body: YtsResponse) -> Result<Vec<TorrentResult>, SourceError> {
    if body.status != "ok" {
        return Err(SourceError::Parse(format!(
            "YTS status {:?}: {}",
            body.status, body.status_message
        )));
    }

    let Some(data) = body.data else {
        return Ok(Vec::new());
    };
    if data.movie_count == 0 {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for movie in data.movies.unwrap_or_default() {
        for torrent in movie.torrents {
            let ten_bit = torrent.bit_depth.as_deref() == Some("10");
            let Some(quality) = resolution_from_field(&torrent.quality, ten_bit) else {
                continue;
            };
            let Some(info_hash) = canonical_hash(torrent.hash.trim()) else {
                continue;
            };
            results.push(TorrentResult {
                magnet_url: build_magnet(&info_hash, &movie.title_long),
                title: movie.title_long.clone(),
                quality,
                info_hash,
            });
        }
    }
    Ok(results)
}

fn build_magnet(info_hash: &str, title: &str) -> String {
    let mut magnet = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        info_hash,
        urlencoding::encode(title)
    );
    for tracker in TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(tracker));
    }
    magnet
}

#[async_trait]
impl Source for YtsSource {
    fn name(&self) -> &str {
        YTS_SOURCE_NAME
    }

    async fn check(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
        self.check_with_attempts(imdb_id, 1).await
    }

    fn supports_retries(&self) -> bool {
        true
    }

    async fn check_with_attempts(
        &self,
        imdb_id: &str,
        attempts: u32,
    ) -> Result<Vec<TorrentResult>, SourceError> {
        validate_identifier(imdb_id)?;
        let start = Instant::now();

        if let Some(results) = self
            .cache
            .lookup_results(imdb_id, YTS_SOURCE_NAME, self.max_age)
            .into_hit()
        {
            metrics::observe_source_check(YTS_SOURCE_NAME, true, start.elapsed());
            return Ok(results);
        }

        let attempts = attempts.max(1);
        let mut attempt = 1;
        let outcome = loop {
            match self.fetch(imdb_id).await {
                Ok(results) => break Ok(results),
                Err(e) if attempt < attempts => {
                    warn!(
                        imdb_id = imdb_id,
                        attempt = attempt,
                        attempts = attempts,
                        error = %e,
                        "YTS request failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        if let Ok(results) = &outcome {
            debug!(
                imdb_id = imdb_id,
                torrent_count = results.len(),
                attempt = attempt,
                "YTS search complete"
            );
            self.cache.store_results(imdb_id, YTS_SOURCE_NAME, results);
        }
        metrics::observe_source_check(YTS_SOURCE_NAME, outcome.is_ok(), start.elapsed());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> YtsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_response() {
        let body = response(json!({
            "status": "ok",
            "status_message": "Query was successful",
            "data": {
                "movie_count": 1,
                "movies": [{
                    "title_long": "Big Buck Bunny (2008)",
                    "torrents": [
                        {"hash": "aaaa1111", "quality": "720p"},
                        {"hash": "bbbb2222", "quality": "2160p", "bit_depth": "10"},
                        {"hash": "cccc3333", "quality": "3D"},
                        {"hash": "", "quality": "1080p"},
                        {"hash": "not a hash", "quality": "1080p"}
                    ]
                }]
            }
        }));

        let results = parse_response(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].quality, "720p");
        assert_eq!(results[0].info_hash, "AAAA1111");
        assert_eq!(results[0].title, "Big Buck Bunny (2008)");
        assert_eq!(results[1].quality, "2160p 10bit");
        assert!(results[1]
            .magnet_url
            .starts_with("magnet:?xt=urn:btih:BBBB2222&dn=Big%20Buck%20Bunny%20%282008%29&tr="));
    }

    #[test]
    fn test_parse_response_no_movies() {
        let body = response(json!({
            "status": "ok",
            "status_message": "Query was successful",
            "data": {"movie_count": 0, "limit": 20, "page_number": 1}
        }));
        assert!(parse_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_response_error_status() {
        let body = response(json!({
            "status": "error",
            "status_message": "Something went wrong"
        }));
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref msg) if msg.contains("Something went wrong")));
    }

    #[test]
    fn test_build_magnet_carries_trackers() {
        let magnet = build_magnet("ABCD", "Movie");
        assert!(magnet.starts_with("magnet:?xt=urn:btih:ABCD&dn=Movie&tr="));
        assert_eq!(magnet.matches("&tr=").count(), TRACKERS.len());
    }
}
