use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::llm::Embedder;
use crate::models::SearchResult;
use crate::retry::RetryPolicy;
use crate::vector::cache::{content_hash, EmbeddingCache};

/// One embedded document in the index. Embeddings are stored L2-normalized so
/// similarity search is a plain dot product.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    hash: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
struct PendingDoc {
    id: String,
    hash: String,
    embedding: Vec<f32>,
}

/// A similarity hit from [`VectorIndex::search`].
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub hash: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub indexed: usize,
    pub pending: usize,
    pub tracked: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Serialize)]
struct MetadataOut<'a> {
    tracked: &'a HashMap<String, String>,
    cache: &'a EmbeddingCache,
}

#[derive(Deserialize, Default)]
struct MetadataIn {
    #[serde(default)]
    tracked: HashMap<String, String>,
    #[serde(default)]
    cache: EmbeddingCache,
}

/// In-memory vector index with batched insertion, embedding cache, and disk
/// persistence.
///
/// New documents are embedded outside any lock and land in a pending buffer;
/// `search` flushes the buffer before scoring so a search always sees every
/// document added before it. Documents are deduplicated by content hash, with
/// id-to-hash aliases so duplicate content is embedded once.
///
/// Lock order where several are held: `tracked` before `hashes` before
/// `pending` before `entries` before `cache`. Accessors that only need
/// counters (`stats`) take each lock transiently, one statement at a time,
/// and never nest them.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<IndexEntry>>,
    pending: Mutex<Vec<PendingDoc>>,
    /// id → content hash, including aliases for duplicate content.
    tracked: RwLock<HashMap<String, String>>,
    /// Hashes already embedded or queued, so one content is embedded once.
    hashes: Mutex<HashSet<String>>,
    cache: Mutex<EmbeddingCache>,
    embed_semaphore: tokio::sync::Semaphore,
    retry: RetryPolicy,
    index_path: PathBuf,
    metadata_path: PathBuf,
}

impl VectorIndex {
    /// Open a persisted index from `config.data_dir`, or start empty.
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let index_path = config.index_path();
        let metadata_path = config.metadata_path();
        let rc = &config.retrieval;

        let entries: Vec<IndexEntry> = if index_path.exists() {
            let data =
                std::fs::read_to_string(&index_path).context("Failed to read vector index")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut meta: MetadataIn = if metadata_path.exists() {
            let data = std::fs::read_to_string(&metadata_path)
                .context("Failed to read index metadata")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            MetadataIn::default()
        };
        meta.cache.configure(rc.cache_ttl_hours, rc.cache_max_entries);

        let hashes: HashSet<String> = entries.iter().map(|e| e.hash.clone()).collect();

        Ok(Self {
            embedder,
            entries: RwLock::new(entries),
            pending: Mutex::new(Vec::new()),
            tracked: RwLock::new(meta.tracked),
            hashes: Mutex::new(hashes),
            cache: Mutex::new(meta.cache),
            embed_semaphore: tokio::sync::Semaphore::new(rc.max_concurrent_embeddings.max(1)),
            retry: RetryPolicy::new(rc.embedding_retry_attempts, rc.embedding_retry_delay_ms),
            index_path,
            metadata_path,
        })
    }

    /// Embed a text, consulting the cache first. The semaphore bounds how many
    /// provider calls run at once; it is never held across cache access.
    async fn embedding(&self, text: &str) -> Result<Vec<f32>> {
        let hash = content_hash(text);
        if let Some(cached) = self.cache.lock().get(&hash) {
            return Ok(cached);
        }

        let _permit = self.embed_semaphore.acquire().await?;
        let embedding = self
            .retry
            .run("embedding", || self.embedder.embed(text))
            .await?;
        self.cache.lock().insert(hash, embedding.clone());
        Ok(embedding)
    }

    /// Queue documents for indexing. The embedded text is the title joined
    /// with the content, so two pages sharing boilerplate content still get
    /// distinct vectors. That same text is hashed for dedup: an id whose text
    /// is already indexed becomes an alias without a provider call. Documents
    /// whose embedding fails are skipped with a warning rather than failing
    /// the batch. Returns how many new embeddings were queued.
    pub async fn add_documents(&self, results: &[SearchResult]) -> Result<usize> {
        // Phase 1: decide what actually needs embedding, under the dedup locks
        let mut jobs: Vec<(String, String, String)> = Vec::new();
        {
            let mut tracked = self.tracked.write();
            let mut hashes = self.hashes.lock();
            for r in results {
                if r.content.trim().is_empty() || tracked.contains_key(&r.id) {
                    continue;
                }
                let text = embedding_text(r);
                let hash = content_hash(&text);
                tracked.insert(r.id.clone(), hash.clone());
                if !hashes.insert(hash.clone()) {
                    continue;
                }
                jobs.push((r.id.clone(), hash, text));
            }
        }
        if jobs.is_empty() {
            return Ok(0);
        }

        // Phase 2: embed concurrently, no locks held
        let embeddings =
            futures_util::future::join_all(jobs.iter().map(|(_, _, text)| self.embedding(text)))
                .await;

        // Phase 3: queue successes, roll back dedup state for failures
        let mut failed_hashes: Vec<String> = Vec::new();
        let mut added = 0;
        {
            let mut pending = self.pending.lock();
            for ((id, hash, _), embedded) in jobs.iter().zip(embeddings) {
                match embedded {
                    Ok(embedding) => {
                        pending.push(PendingDoc {
                            id: id.clone(),
                            hash: hash.clone(),
                            embedding,
                        });
                        added += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping document {id}: embedding failed: {e}");
                        failed_hashes.push(hash.clone());
                    }
                }
            }
        }
        if !failed_hashes.is_empty() {
            let mut tracked = self.tracked.write();
            let mut hashes = self.hashes.lock();
            for hash in &failed_hashes {
                hashes.remove(hash);
            }
            tracked.retain(|_, h| !failed_hashes.contains(h));
        }

        Ok(added)
    }

    /// Move pending documents into the searchable index, normalizing their
    /// embeddings. Returns how many were flushed.
    pub fn flush_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return 0;
        }
        let mut entries = self.entries.write();
        let count = pending.len();
        for doc in pending.drain(..) {
            entries.push(IndexEntry {
                id: doc.id,
                hash: doc.hash,
                embedding: l2_normalize(doc.embedding),
            });
        }
        tracing::debug!("Flushed {count} documents into vector index");
        count
    }

    /// Similarity search. Flushes the pending buffer first so every document
    /// added before this call participates.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorHit>> {
        self.flush_pending();
        let query_embedding = l2_normalize(self.embedding(query).await?);

        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .map(|e| VectorHit {
                id: e.id.clone(),
                hash: e.hash.clone(),
                score: dot(&query_embedding, &e.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Content hash a document id resolves to, aliases included.
    pub fn hash_for(&self, id: &str) -> Option<String> {
        self.tracked.read().get(id).cloned()
    }

    /// Counter snapshot. Each lock is taken and released per statement so this
    /// never holds two guards at once and cannot invert the lock order against
    /// writers like `flush_pending` or `save`.
    pub fn stats(&self) -> IndexStats {
        let tracked = self.tracked.read().len();
        let pending = self.pending.lock().len();
        let indexed = self.entries.read().len();
        let (cache_entries, cache_hits, cache_misses) = {
            let cache = self.cache.lock();
            let (hits, misses) = cache.hit_counts();
            (cache.len(), hits, misses)
        };
        IndexStats {
            indexed,
            pending,
            tracked,
            cache_entries,
            cache_hits,
            cache_misses,
        }
    }

    /// Persist index and metadata to disk (atomic write via temp file + rename).
    pub fn save(&self) -> Result<()> {
        self.flush_pending();

        let data = serde_json::to_string(&*self.entries.read())?;
        write_atomic(&self.index_path, &data)?;

        let tracked = self.tracked.read();
        let cache = self.cache.lock();
        let meta = MetadataOut {
            tracked: &tracked,
            cache: &cache,
        };
        let data = serde_json::to_string(&meta)?;
        write_atomic(&self.metadata_path, &data)?;

        Ok(())
    }
}

/// Text a document is embedded and hashed as: title plus content.
fn embedding_text(result: &SearchResult) -> String {
    if result.title.trim().is_empty() {
        return result.content.clone();
    }
    format!("{}\n\n{}", result.title, result.content)
}

fn write_atomic(path: &std::path::Path, data: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {} into place", tmp_path.display()))?;
    Ok(())
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
