//! Byte-keyed, byte-valued in-memory store with a fixed memory budget.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ciborium::value::Value;
use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use super::CacheError;

/// Largest value the regular `set` path accepts. Bigger values need `set_big`.
pub const MAX_VALUE_LEN: usize = 64 * 1024;

struct Inner {
    entries: LruCache<Vec<u8>, Vec<u8>>,
    /// Sum of key and value lengths of all entries.
    bytes_used: usize,
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes_used: usize,
    pub max_bytes: usize,
}

/// Shared result cache.
///
/// Safe for concurrent use. When the budget is exceeded the least recently
/// used entries are evicted. Freshness is not tracked here; it lives inside
/// the encoded entries and is judged by the reader.
pub struct ResultCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl ResultCache {
    /// Create an empty cache holding at most `max_bytes` of keys and values.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes_used: 0,
            }),
            max_bytes,
        }
    }

    // A panic while holding the lock can't leave `Inner` half-updated in a way
    // that matters more than losing a cache entry, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a value, marking it as recently used.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lock().entries.get(key).cloned()
    }

    /// Whether a key is present, without touching its recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.lock().entries.contains(key)
    }

    /// Store a value of at most `MAX_VALUE_LEN` bytes.
    pub fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), CacheError> {
        if value.len() > MAX_VALUE_LEN {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                limit: MAX_VALUE_LEN,
            });
        }
        self.insert(key, value);
        Ok(())
    }

    /// Store a value of any size.
    pub fn set_big(&self, key: &[u8], value: Vec<u8>) {
        self.insert(key, value);
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let added = key.len() + value.len();
        if let Some(old) = inner.entries.put(key.to_vec(), value) {
            inner.bytes_used -= key.len() + old.len();
        }
        inner.bytes_used += added;

        let mut evicted = 0;
        while inner.bytes_used > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((k, v)) => {
                    inner.bytes_used -= k.len() + v.len();
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted least recently used cache entries");
        }
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &[u8]) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.entries.pop(key) {
            Some(old) => {
                inner.bytes_used -= key.len() + old.len();
                true
            }
            None => false,
        }
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.bytes_used = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.lock();
        CacheStats {
            entries: guard.entries.len(),
            bytes_used: guard.bytes_used,
            max_bytes: self.max_bytes,
        }
    }

    /// Persist all entries to `path`.
    ///
    /// Entries are written least recently used first so that loading them back
    /// in order restores recency. The file is written next to `path` first and
    /// then renamed over it. Returns the number of entries written.
    pub fn save_to_file(&self, path: &Path) -> Result<usize, CacheError> {
        let snapshot: Vec<Value> = {
            let guard = self.lock();
            guard
                .entries
                .iter()
                .rev()
                .map(|(k, v)| Value::Array(vec![Value::Bytes(k.clone()), Value::Bytes(v.clone())]))
                .collect()
        };
        let count = snapshot.len();

        let tmp_path = tmp_path_for(path);
        let file = fs::File::create(&tmp_path)
            .map_err(|e| CacheError::Io(format!("{}: {}", tmp_path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        ciborium::into_writer(&Value::Array(snapshot), &mut writer)
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| CacheError::Io(format!("{}: {}", tmp_path.display(), e)))?;
        drop(writer);

        fs::rename(&tmp_path, path)
            .map_err(|e| CacheError::Io(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), entries = count, "Persisted cache");
        Ok(count)
    }

    /// Load a cache persisted with `save_to_file`.
    ///
    /// If the file holds more than `max_bytes`, the oldest entries are evicted
    /// while loading.
    pub fn load_from_file(path: &Path, max_bytes: usize) -> Result<Self, CacheError> {
        let data =
            fs::read(path).map_err(|e| CacheError::Io(format!("{}: {}", path.display(), e)))?;
        let value: Value =
            ciborium::from_reader(&data[..]).map_err(|e| CacheError::Decode(e.to_string()))?;

        let Value::Array(items) = value else {
            return Err(CacheError::Decode("expected an array of entries".to_string()));
        };

        let cache = Self::new(max_bytes);
        for item in items {
            let Value::Array(pair) = item else {
                return Err(CacheError::Decode("expected a [key, value] pair".to_string()));
            };
            match <[Value; 2]>::try_from(pair) {
                Ok([Value::Bytes(key), Value::Bytes(value)]) => cache.insert(&key, value),
                _ => {
                    return Err(CacheError::Decode(
                        "expected a [key, value] pair of byte strings".to_string(),
                    ))
                }
            }
        }

        debug!(path = %path.display(), entries = cache.len(), "Loaded persisted cache");
        Ok(cache)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
