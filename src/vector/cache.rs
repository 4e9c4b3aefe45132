use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// How many characters of a document participate in its content hash. Long
/// pages differ in their prefix long before the tail, and the embedding input
/// is truncated to the same region anyway.
const HASH_PREFIX_CHARS: usize = 8_000;

/// Fraction of entries dropped when the cache exceeds its size cap.
const EVICTION_FRACTION: usize = 10;

/// Content hash used as both cache key and index dedup key: SHA-256 over the
/// first [`HASH_PREFIX_CHARS`] characters of the text.
pub fn content_hash(text: &str) -> String {
    let mut end = text.len().min(HASH_PREFIX_CHARS);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let digest = Sha256::digest(text[..end].as_bytes());
    format!("{digest:x}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
}

/// TTL-bounded embedding cache keyed by content hash.
///
/// Not internally synchronized: the vector index owns one behind a mutex.
/// Entries expire after `ttl_hours`; when the map exceeds `max_entries` the
/// oldest tenth is dropped before inserting.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingCache {
    entries: HashMap<String, CacheEntry>,
    ttl_hours: u64,
    max_entries: usize,
    #[serde(default)]
    hits: u64,
    #[serde(default)]
    misses: u64,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(24, 10_000)
    }
}

impl EmbeddingCache {
    pub fn new(ttl_hours: u64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_hours,
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Re-apply configured limits after loading a persisted cache, dropping
    /// anything already expired under the new TTL.
    pub fn configure(&mut self, ttl_hours: u64, max_entries: usize) {
        self.ttl_hours = ttl_hours;
        self.max_entries = max_entries.max(1);
        let cutoff = Utc::now() - Duration::hours(self.ttl_hours as i64);
        self.entries.retain(|_, e| e.created_at > cutoff);
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.evict_oldest(excess);
        }
    }

    /// Look up a cached embedding. Expired entries are removed and count as
    /// misses.
    pub fn get(&mut self, hash: &str) -> Option<Vec<f32>> {
        let cutoff = Utc::now() - Duration::hours(self.ttl_hours as i64);
        match self.entries.get(hash) {
            Some(entry) if entry.created_at > cutoff => {
                self.hits += 1;
                Some(entry.embedding.clone())
            }
            Some(_) => {
                self.entries.remove(hash);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, hash: String, embedding: Vec<f32>) {
        if self.entries.len() >= self.max_entries {
            let batch = (self.max_entries / EVICTION_FRACTION).max(1);
            self.evict_oldest(batch);
        }
        self.entries.insert(
            hash,
            CacheEntry {
                embedding,
                created_at: Utc::now(),
            },
        );
    }

    fn evict_oldest(&mut self, count: usize) {
        let mut by_age: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);
        for (key, _) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        tracing::debug!("Evicted {count} oldest embedding cache entries");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_counts(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
