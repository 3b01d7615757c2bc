use std::collections::HashMap;
use std::sync::RwLock;

use crate::BoxFuture;
use crate::chunker::Chunk;
use crate::error::StoreError;
use crate::store::{
    ChunkStore, IndexingStatus, ScoredChunk, SearchFilter, StatusUpdate, StoreReport,
};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Non-persistent [`ChunkStore`] with brute-force cosine search.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<String, Vec<StoredChunk>>>,
    statuses: RwLock<HashMap<String, IndexingStatus>>,
    dimensions: Option<usize>,
}

impl InMemoryChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            dimensions: None,
        }
    }

    /// Reject vectors whose length differs from `dimensions`.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Number of chunks stored for `repo_key`.
    #[must_use]
    pub fn chunk_count(&self, repo_key: &str) -> usize {
        self.chunks
            .read()
            .map(|c| c.get(repo_key).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl ChunkStore for InMemoryChunkStore {
    fn initialize_indexing_status(&self, repo_key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let mut statuses = self.statuses.write().map_err(backend)?;
            statuses.insert(repo_key.clone(), IndexingStatus::started(&repo_key));
            Ok(())
        })
    }

    fn update_indexing_status(
        &self,
        repo_key: &str,
        update: StatusUpdate,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let mut statuses = self.statuses.write().map_err(backend)?;
            let status = statuses
                .get_mut(&repo_key)
                .ok_or(StoreError::UnknownRepository(repo_key.clone()))?;
            status.apply(update);
            Ok(())
        })
    }

    fn delete_repository_chunks(&self, repo_key: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let mut chunks = self.chunks.write().map_err(backend)?;
            Ok(chunks.remove(&repo_key).map_or(0, |v| v.len()))
        })
    }

    fn store_chunks(
        &self,
        repo_key: &str,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'_, Result<StoreReport, StoreError>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let mut all = self.chunks.write().map_err(backend)?;
            let stored = all.entry(repo_key.clone()).or_default();
            let mut report = StoreReport::default();

            for mut chunk in chunks {
                let Some(vector) = chunk.embedding.take() else {
                    report.failed += 1;
                    continue;
                };
                let expected = self
                    .dimensions
                    .or_else(|| stored.first().map(|s| s.vector.len()));
                if expected.is_some_and(|d| d != vector.len()) || vector.is_empty() {
                    tracing::warn!(
                        repo = %repo_key,
                        path = %chunk.file_path,
                        dims = vector.len(),
                        "rejecting chunk with wrong vector dimension"
                    );
                    report.failed += 1;
                    continue;
                }
                stored.push(StoredChunk { chunk, vector });
                report.successful += 1;
            }
            Ok(report)
        })
    }

    fn search_chunks(
        &self,
        vector: Vec<f32>,
        filter: SearchFilter,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, StoreError>> {
        Box::pin(async move {
            if let Some(expected) = self.dimensions
                && expected != vector.len()
            {
                return Err(StoreError::Dimension {
                    expected,
                    actual: vector.len(),
                });
            }

            let all = self.chunks.read().map_err(backend)?;
            let mut scored: Vec<ScoredChunk> = all
                .iter()
                .filter(|(key, _)| filter.repo.as_deref().is_none_or(|r| r == key.as_str()))
                .flat_map(|(key, stored)| stored.iter().map(move |s| (key, s)))
                .filter(|(_, s)| {
                    filter
                        .language
                        .as_deref()
                        .is_none_or(|l| s.chunk.language.eq_ignore_ascii_case(l))
                })
                .map(|(key, s)| (key, s, cosine_similarity(&vector, &s.vector)))
                .filter(|(_, _, score)| *score >= filter.threshold)
                .map(|(key, s, similarity)| ScoredChunk {
                    repo_key: key.clone(),
                    chunk: s.chunk.clone(),
                    similarity,
                })
                .collect();

            scored.sort_by(|a, b| {
                b.similarity
                    .total_cmp(&a.similarity)
                    .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
                    .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
            });
            scored.truncate(filter.limit);
            Ok(scored)
        })
    }

    fn list_indexed_repositories(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let all = self.chunks.read().map_err(backend)?;
            let mut keys: Vec<String> = all
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, _)| k.clone())
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn get_indexing_status(
        &self,
        repo_key: &str,
    ) -> BoxFuture<'_, Result<Option<IndexingStatus>, StoreError>> {
        let repo_key = repo_key.to_owned();
        Box::pin(async move {
            let statuses = self.statuses.read().map_err(backend)?;
            Ok(statuses.get(&repo_key).cloned())
        })
    }
}
