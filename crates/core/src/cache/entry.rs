//! Cache entry encoding.
//!
//! Entries are CBOR so they stay self-describing across process restarts and
//! can be inspected with generic tooling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CacheError;
use crate::source::TorrentResult;

/// The results one source returned for one identifier, with their creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created: DateTime<Utc>,
    pub results: Vec<TorrentResult>,
}

/// Borrowed twin of `CacheEntry` so encoding doesn't need to clone results.
#[derive(Serialize)]
struct CacheEntryRef<'a> {
    created: DateTime<Utc>,
    results: &'a [TorrentResult],
}

impl CacheEntry {
    /// Age at `now`. An entry from the future (clock skew) is treated as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the entry may still be served.
    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < max_age
    }
}

/// Key under which a source caches its results for an identifier.
pub fn cache_key(imdb_id: &str, source_name: &str) -> String {
    format!("{}-{}", imdb_id, source_name)
}

/// Serialize results together with their creation time.
pub fn encode_entry(
    created: DateTime<Utc>,
    results: &[TorrentResult],
) -> Result<Vec<u8>, CacheError> {
    let entry = CacheEntryRef { created, results };
    let mut buf = Vec::new();
    ciborium::into_writer(&entry, &mut buf).map_err(|e| CacheError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Inverse of `encode_entry`. Fails cleanly on truncated or foreign bytes.
pub fn decode_entry(data: &[u8]) -> Result<(Vec<TorrentResult>, DateTime<Utc>), CacheError> {
    let entry: CacheEntry =
        ciborium::from_reader(data).map_err(|e| CacheError::Decode(e.to_string()))?;
    Ok((entry.results, entry.created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use chrono::TimeZone;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("tt0111161", "ibit"), "tt0111161-ibit");
        assert_eq!(cache_key("tt0111161", "YTS"), "tt0111161-YTS");
    }

    #[test]
    fn test_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let results = vec![
            fixtures::torrent_result("Movie", "1080p", "AAAA"),
            fixtures::torrent_result("Movie", "2160p 10bit (⚠️cam)", "BBBB"),
        ];

        let bytes = encode_entry(created, &results).unwrap();
        let (decoded, decoded_created) = decode_entry(&bytes).unwrap();

        assert_eq!(decoded, results);
        assert_eq!(decoded_created, created);
    }

    #[test]
    fn test_round_trip_empty() {
        let created = Utc::now();
        let bytes = encode_entry(created, &[]).unwrap();
        let (decoded, decoded_created) = decode_entry(&bytes).unwrap();

        assert!(decoded.is_empty());
        assert_eq!(decoded_created, created);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let created = Utc::now();
        let results = vec![fixtures::torrent_result("Movie", "720p", "AAAA")];
        assert_eq!(
            encode_entry(created, &results).unwrap(),
            encode_entry(created, &results).unwrap()
        );
    }

    #[test]
    fn test_decode_truncated_fails() {
        let results = vec![fixtures::torrent_result("Movie", "720p", "AAAA")];
        let bytes = encode_entry(Utc::now(), &results).unwrap();

        for len in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            let err = decode_entry(&bytes[..len]).unwrap_err();
            assert!(matches!(err, CacheError::Decode(_)), "len {}", len);
        }
    }

    #[test]
    fn test_decode_foreign_bytes_fails() {
        assert!(decode_entry(b"definitely not cbor \xff\xfe").is_err());
        assert!(decode_entry(&[0xff; 32]).is_err());

        // Valid CBOR, wrong shape.
        let mut other = Vec::new();
        ciborium::into_writer(&vec![1u32, 2, 3], &mut other).unwrap();
        assert!(matches!(decode_entry(&other), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let max_age = Duration::from_secs(60);

        let fresh = CacheEntry {
            created: now - chrono::Duration::seconds(59),
            results: vec![],
        };
        assert!(fresh.is_fresh(max_age, now));

        let exactly_expired = CacheEntry {
            created: now - chrono::Duration::seconds(60),
            results: vec![],
        };
        assert!(!exactly_expired.is_fresh(max_age, now));

        let from_future = CacheEntry {
            created: now + chrono::Duration::seconds(5),
            results: vec![],
        };
        assert!(from_future.is_fresh(max_age, now));
        assert_eq!(from_future.age(now), Duration::ZERO);
    }
}
