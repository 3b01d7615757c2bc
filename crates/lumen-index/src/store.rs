//! Vector store interface for chunk vectors and indexing status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::chunker::Chunk;
use crate::error::StoreError;
use crate::job::{JobStats, JobStatus, Phase};

/// Indexing status persisted next to a repository's chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStatus {
    pub repo_key: String,
    pub status: JobStatus,
    pub phase: Phase,
    pub progress_percent: u8,
    pub stats: JobStats,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IndexingStatus {
    #[must_use]
    pub fn started(repo_key: &str) -> Self {
        Self {
            repo_key: repo_key.to_string(),
            status: JobStatus::InProgress,
            phase: Phase::Initializing,
            progress_percent: 0,
            stats: JobStats::default(),
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge the fields present in `update`.
    pub fn apply(&mut self, update: StatusUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(phase) = update.phase {
            self.phase = phase;
        }
        if let Some(progress) = update.progress_percent {
            self.progress_percent = progress;
        }
        if let Some(stats) = update.stats {
            self.stats = stats;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial status change; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<JobStatus>,
    pub phase: Option<Phase>,
    pub progress_percent: Option<u8>,
    pub stats: Option<JobStats>,
    pub error: Option<String>,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub successful: usize,
    pub failed: usize,
}

/// Metadata filter and ranking bounds for a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub repo: Option<String>,
    pub language: Option<String>,
    /// Minimum cosine similarity to return.
    pub threshold: f32,
    pub limit: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            repo: None,
            language: None,
            threshold: 0.7,
            limit: 10,
        }
    }
}

/// A stored chunk returned by a search, without its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    pub repo_key: String,
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Persistence for chunk vectors and per-repository indexing status.
pub trait ChunkStore: Send + Sync {
    /// Reset the status record for `repo_key` to a fresh in-progress state.
    fn initialize_indexing_status(&self, repo_key: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn update_indexing_status(
        &self,
        repo_key: &str,
        update: StatusUpdate,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove every chunk for `repo_key`, returning how many were removed.
    fn delete_repository_chunks(&self, repo_key: &str) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// Insert embedded chunks. Chunks the store rejects count as `failed`.
    fn store_chunks(
        &self,
        repo_key: &str,
        chunks: Vec<Chunk>,
    ) -> BoxFuture<'_, Result<StoreReport, StoreError>>;

    /// Chunks with `similarity >= filter.threshold`, most similar first, at
    /// most `filter.limit`.
    fn search_chunks(
        &self,
        vector: Vec<f32>,
        filter: SearchFilter,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>, StoreError>>;

    fn list_indexed_repositories(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>>;

    fn get_indexing_status(
        &self,
        repo_key: &str,
    ) -> BoxFuture<'_, Result<Option<IndexingStatus>, StoreError>>;
}
