//! Types for the torrent source contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A torrent candidate discovered by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentResult {
    /// Display title as found at the source.
    pub title: String,
    /// "720p", "1080p" or "2160p", optionally followed by " 10bit" and/or the cam marker.
    pub quality: String,
    /// Info hash (uppercase hex) - used for deduplication. Never empty.
    pub info_hash: String,
    /// Magnet URI carrying the same info hash.
    pub magnet_url: String,
}

/// Errors that can occur while querying a single source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Couldn't GET {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("Bad GET response from {url}: HTTP {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Request timeout")]
    Timeout,

    #[error("Couldn't parse response: {0}")]
    Parse(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SourceError {
    /// Classify a reqwest error the way every HTTP-backed source reports it.
    pub fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Trait for upstream torrent sources.
///
/// A source answers with either a (possibly empty) list of results or an
/// error, never both. It may read and fill the shared result cache and may
/// retry internally before answering.
#[async_trait]
pub trait Source: Send + Sync {
    /// Source name for logging, cache keys and the aggregator's source map.
    fn name(&self) -> &str;

    /// Look up torrents for an IMDb-style identifier.
    async fn check(&self, imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError>;

    /// Whether `check_with_attempts` does anything beyond `check`.
    fn supports_retries(&self) -> bool {
        false
    }

    /// Like `check`, but tries up to `attempts` times before giving up.
    async fn check_with_attempts(
        &self,
        imdb_id: &str,
        _attempts: u32,
    ) -> Result<Vec<TorrentResult>, SourceError> {
        self.check(imdb_id).await
    }
}

/// Reject identifiers a source can't possibly search for.
pub fn validate_identifier(imdb_id: &str) -> Result<(), SourceError> {
    if imdb_id.trim().is_empty() {
        return Err(SourceError::InvalidIdentifier(imdb_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_result_serialization() {
        let result = TorrentResult {
            title: "Big Buck Bunny".to_string(),
            quality: "1080p 10bit".to_string(),
            info_hash: "DD8255ECDC7CA55FB0BBF81323D87062DB1F6D1C".to_string(),
            magnet_url: "magnet:?xt=urn:btih:DD8255ECDC7CA55FB0BBF81323D87062DB1F6D1C".to_string(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let parsed: TorrentResult = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, result);
    }

    #[test]
    fn test_source_error_messages() {
        let err = SourceError::BadStatus {
            url: "https://example.org/x".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "Bad GET response from https://example.org/x: HTTP 503"
        );

        let err = SourceError::InvalidIdentifier(String::new());
        assert_eq!(err.to_string(), "Invalid identifier: \"\"");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("tt0111161").is_ok());
        assert!(matches!(
            validate_identifier(""),
            Err(SourceError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            validate_identifier("   "),
            Err(SourceError::InvalidIdentifier(_))
        ));
    }

    struct Plain;

    #[async_trait]
    impl Source for Plain {
        fn name(&self) -> &str {
            "plain"
        }

        async fn check(&self, _imdb_id: &str) -> Result<Vec<TorrentResult>, SourceError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_default_check_with_attempts_delegates_to_check() {
        let source = Plain;
        assert!(!source.supports_retries());
        let results = source.check_with_attempts("tt1", 5).await.unwrap();
        assert!(results.is_empty());
    }
}
