//! Shared result cache.
//!
//! `store` is the raw byte store, `entry` the encoding of one source's results
//! for one identifier. The read-through/write-through helpers every source
//! uses live here.

mod entry;
mod store;

pub use entry::{cache_key, decode_entry, encode_entry, CacheEntry};
pub use store::{CacheStats, ResultCache, MAX_VALUE_LEN};

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics;
use crate::source::TorrentResult;

/// Errors that can occur in the result cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Couldn't encode cache entry: {0}")]
    Encode(String),

    #[error("Couldn't decode cache entry: {0}")]
    Decode(String),

    #[error("Value of {size} bytes exceeds the {limit} byte limit")]
    ValueTooLarge { size: usize, limit: usize },

    #[error("Cache file error: {0}")]
    Io(String),
}

/// What a cache lookup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A fresh entry.
    Hit(Vec<TorrentResult>),
    /// An entry past its age limit.
    Expired { expired_for: Duration },
    /// Bytes that don't decode.
    Corrupt(CacheError),
    Miss,
}

impl CacheLookup {
    fn outcome(&self) -> &'static str {
        match self {
            CacheLookup::Hit(_) => "hit",
            CacheLookup::Expired { .. } => "expired",
            CacheLookup::Corrupt(_) => "corrupt",
            CacheLookup::Miss => "miss",
        }
    }

    /// The cached results, if they may be served.
    pub fn into_hit(self) -> Option<Vec<TorrentResult>> {
        match self {
            CacheLookup::Hit(results) => Some(results),
            _ => None,
        }
    }
}

impl ResultCache {
    /// Look up what `source_name` cached for `imdb_id`.
    ///
    /// Anything but a fresh entry should be treated as a miss by the caller.
    pub fn lookup_results(
        &self,
        imdb_id: &str,
        source_name: &str,
        max_age: Duration,
    ) -> CacheLookup {
        let key = cache_key(imdb_id, source_name);
        let lookup = match self.get(key.as_bytes()) {
            None => {
                debug!(imdb_id = imdb_id, source = source_name, "Torrent results not found in cache");
                CacheLookup::Miss
            }
            Some(data) => match decode_entry(&data) {
                Err(e) => {
                    error!(
                        imdb_id = imdb_id,
                        source = source_name,
                        error = %e,
                        "Couldn't decode cached torrent results"
                    );
                    CacheLookup::Corrupt(e)
                }
                Ok((results, created)) => {
                    let entry = CacheEntry { created, results };
                    let now = Utc::now();
                    if entry.is_fresh(max_age, now) {
                        debug!(
                            imdb_id = imdb_id,
                            source = source_name,
                            torrent_count = entry.results.len(),
                            "Hit torrent results in cache"
                        );
                        CacheLookup::Hit(entry.results)
                    } else {
                        let expired_for = entry.age(now).saturating_sub(max_age);
                        debug!(
                            imdb_id = imdb_id,
                            source = source_name,
                            expired_for = ?expired_for,
                            "Expired torrent results in cache"
                        );
                        CacheLookup::Expired { expired_for }
                    }
                }
            },
        };

        metrics::CACHE_LOOKUPS
            .with_label_values(&[source_name, lookup.outcome()])
            .inc();
        lookup
    }

    /// Store `results` for `imdb_id` under `source_name`, stamped with the current time.
    ///
    /// Never fails the caller: encoding problems are logged.
    pub fn store_results(&self, imdb_id: &str, source_name: &str, results: &[TorrentResult]) {
        let key = cache_key(imdb_id, source_name);
        let data = match encode_entry(Utc::now(), results) {
            Ok(data) => data,
            Err(e) => {
                error!(
                    imdb_id = imdb_id,
                    source = source_name,
                    error = %e,
                    "Couldn't encode torrent results for the cache"
                );
                return;
            }
        };

        if data.len() > MAX_VALUE_LEN {
            warn!(
                imdb_id = imdb_id,
                source = source_name,
                entry_size = data.len(),
                "Cache entry is bigger than 64 KiB, storing it as a big value"
            );
            self.set_big(key.as_bytes(), data);
            return;
        }

        let entry_size = data.len();
        match self.set(key.as_bytes(), data) {
            Ok(()) => debug!(
                imdb_id = imdb_id,
                source = source_name,
                torrent_count = results.len(),
                entry_size = entry_size,
                "Cached torrent results"
            ),
            Err(e) => error!(
                imdb_id = imdb_id,
                source = source_name,
                error = %e,
                "Couldn't cache torrent results"
            ),
        }
    }
}
