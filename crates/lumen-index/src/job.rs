//! Indexing job state and the per-orchestrator job registry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IndexError, PartialFailure, Result};

/// Key identifying a repository: `owner/repo`.
#[must_use]
pub fn repo_key(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initializing,
    Fetching,
    Chunking,
    Embedding,
    Storing,
    Finalizing,
}

impl Phase {
    /// Progress reported on entering this phase.
    #[must_use]
    pub fn progress(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Fetching => 10,
            Self::Chunking => 30,
            Self::Embedding => 50,
            Self::Storing => 80,
            Self::Finalizing => 95,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Fetching => "fetching",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
            Self::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub files: usize,
    pub chunks: usize,
    pub embeddings: usize,
}

/// One indexing run for a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingJob {
    /// Repository key, `owner/repo`.
    pub id: String,
    /// Distinguishes successive runs for the same key.
    pub run_id: Uuid,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub phase: Phase,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub stats: JobStats,
    pub start_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub partial_failures: Vec<PartialFailure>,
}

impl IndexingJob {
    #[must_use]
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        Self {
            id: repo_key(owner, repo),
            run_id: Uuid::new_v4(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            phase: Phase::Initializing,
            status: JobStatus::InProgress,
            progress_percent: Phase::Initializing.progress(),
            stats: JobStats::default(),
            start_time: Utc::now(),
            finished_at: None,
            error: None,
            partial_failures: Vec::new(),
        }
    }
}

/// Status update pushed to observers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub repo_key: String,
    pub run_id: Uuid,
    pub phase: Phase,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub error: Option<String>,
}

impl From<&IndexingJob> for JobEvent {
    fn from(job: &IndexingJob) -> Self {
        Self {
            repo_key: job.id.clone(),
            run_id: job.run_id,
            phase: job.phase,
            status: job.status,
            progress_percent: job.progress_percent,
            error: job.error.clone(),
        }
    }
}

pub type JobEventTx = tokio::sync::mpsc::UnboundedSender<JobEvent>;
pub type JobEventRx = tokio::sync::mpsc::UnboundedReceiver<JobEvent>;

/// In-process job table. One entry per repository key; a finished job stays
/// until the next run for the same key replaces it.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, IndexingJob>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run, atomically refusing if one is already in progress.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Conflict` when the key has an in-progress job.
    pub fn try_begin(&self, owner: &str, repo: &str, branch: &str) -> Result<IndexingJob> {
        let key = repo_key(owner, repo);
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs
            .get(&key)
            .is_some_and(|j| j.status == JobStatus::InProgress)
        {
            return Err(IndexError::Conflict(key));
        }
        let job = IndexingJob::new(owner, repo, branch);
        jobs.insert(key, job.clone());
        Ok(job)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<IndexingJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn is_in_progress(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|j| j.status == JobStatus::InProgress)
    }

    /// Apply `f` to the job for `key` if it belongs to `run_id`, returning
    /// the updated snapshot.
    pub fn update<F>(&self, key: &str, run_id: Uuid, f: F) -> Option<IndexingJob>
    where
        F: FnOnce(&mut IndexingJob),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(key).filter(|j| j.run_id == run_id)?;
        f(job);
        Some(job.clone())
    }

    /// Every known job, ordered by key.
    #[must_use]
    pub fn all(&self) -> Vec<IndexingJob> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }
}
