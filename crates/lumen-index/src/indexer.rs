//! Repository indexing orchestrator: fetch → chunk → embed → store → finalize.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use lumen_llm::LlmProvider;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chunker::{Chunk, Chunker};
use crate::context::contextualize_for_embedding;
use crate::embedding::EmbeddingClient;
use crate::error::{IndexError, PartialFailure, Result};
use crate::job::{
    IndexingJob, JobEvent, JobEventTx, JobRegistry, JobStats, JobStatus, Phase, repo_key,
};
use crate::source::FileSource;
use crate::store::{ChunkStore, StatusUpdate};

/// Summary of a completed indexing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub repo_key: String,
    pub run_id: Uuid,
    pub stats: JobStats,
    /// Chunks the store accepted.
    pub stored: usize,
    /// Chunks the store rejected.
    pub store_failed: usize,
    pub partial_failures: Vec<PartialFailure>,
    pub duration_ms: u64,
}

/// A job running on a background task.
#[derive(Debug)]
pub struct IndexHandle {
    job: IndexingJob,
    task: JoinHandle<Result<IndexReport>>,
}

impl IndexHandle {
    /// Snapshot of the job at registration.
    #[must_use]
    pub fn job(&self) -> &IndexingJob {
        &self.job
    }

    /// Wait for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns the job's fatal error, or `IndexError::Task` if the task
    /// panicked.
    pub async fn wait(self) -> Result<IndexReport> {
        self.task
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
    }
}

/// Per-job mutable state threaded through the phases.
struct RunState {
    key: String,
    run_id: Uuid,
    stats: JobStats,
    failures: Vec<PartialFailure>,
}

/// Sequences indexing phases for repositories, one live job per key.
pub struct IndexOrchestrator<P: LlmProvider> {
    source: Arc<dyn FileSource>,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<EmbeddingClient<P>>,
    chunker: Chunker,
    jobs: JobRegistry,
    events: Option<JobEventTx>,
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl<P: LlmProvider> std::fmt::Debug for IndexOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexOrchestrator")
            .field("chunker", &self.chunker)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> IndexOrchestrator<P> {
    #[must_use]
    pub fn new(
        source: Arc<dyn FileSource>,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<EmbeddingClient<P>>,
        chunker: Chunker,
    ) -> Self {
        Self {
            source,
            store,
            embedder,
            chunker,
            jobs: JobRegistry::new(),
            events: None,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver a [`JobEvent`] on every transition. Sends never block; a
    /// closed receiver is ignored.
    #[must_use]
    pub fn with_events(mut self, tx: JobEventTx) -> Self {
        self.events = Some(tx);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<EmbeddingClient<P>> {
        &self.embedder
    }

    #[must_use]
    pub fn job_status(&self, repo_key: &str) -> Option<IndexingJob> {
        self.jobs.get(repo_key)
    }

    #[must_use]
    pub fn is_indexing(&self, owner: &str, repo: &str) -> bool {
        self.jobs.is_in_progress(&repo_key(owner, repo))
    }

    #[must_use]
    pub fn jobs(&self) -> Vec<IndexingJob> {
        self.jobs.all()
    }

    /// Cancel the in-progress job for `owner/repo`. Returns `false` when no
    /// job is running.
    pub fn cancel(&self, owner: &str, repo: &str) -> bool {
        let key = repo_key(owner, repo);
        let cancels = self.cancels.lock().unwrap_or_else(PoisonError::into_inner);
        match cancels.get(&key) {
            Some(token) => {
                tracing::info!(repo_key = %key, "cancelling indexing job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Index `owner/repo` on the current task.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Conflict` if a job for the key is in progress, or
    /// the fatal error that failed the job.
    pub async fn index_repository(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<IndexReport> {
        let (job, token) = self.register(owner, repo, branch)?;
        self.run(job, token).await
    }

    fn register(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<(IndexingJob, CancellationToken)> {
        let job = self.jobs.try_begin(owner, repo, branch)?;
        let token = CancellationToken::new();
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id.clone(), token.clone());
        self.emit(&job);
        Ok((job, token))
    }

    async fn run(&self, job: IndexingJob, cancel: CancellationToken) -> Result<IndexReport> {
        let started = Instant::now();
        let mut state = RunState {
            key: job.id.clone(),
            run_id: job.run_id,
            stats: JobStats::default(),
            failures: Vec::new(),
        };
        tracing::info!(repo_key = %state.key, branch = %job.branch, run_id = %state.run_id, "indexing started");

        let outcome = self.pipeline(&job, &mut state, &cancel).await;
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&state.key);

        match outcome {
            Ok(report) => {
                let duration_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.transition(&state, |j| {
                    j.status = JobStatus::Completed;
                    j.progress_percent = 100;
                    j.finished_at = Some(chrono::Utc::now());
                });
                tracing::info!(
                    repo_key = %state.key,
                    files = state.stats.files,
                    chunks = state.stats.chunks,
                    embeddings = state.stats.embeddings,
                    partial_failures = state.failures.len(),
                    duration_ms,
                    "indexing completed"
                );
                Ok(IndexReport {
                    duration_ms,
                    ..report
                })
            }
            Err(e) => {
                self.fail(&state, &e).await;
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        job: &IndexingJob,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        self.store.initialize_indexing_status(&state.key).await?;

        // Fetching: a wholesale failure or an empty repository is fatal.
        self.enter(state, Phase::Fetching, cancel).await?;
        let fetched = tokio::select! {
            () = cancel.cancelled() => return Err(IndexError::Cancelled),
            res = self.source.fetch_files(&job.owner, &job.repo, &job.branch) => res?,
        };
        for failure in fetched.failures {
            self.record_failure(state, PartialFailure::new("fetch", failure.path, failure.message));
        }
        if fetched.files.is_empty() {
            return Err(IndexError::NoFiles(state.key.clone()));
        }
        state.stats.files = fetched.files.len();

        self.enter(state, Phase::Chunking, cancel).await?;
        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &fetched.files {
            let outcome = self.chunker.chunk_file(file);
            if let Some(reason) = outcome.fallback {
                self.record_failure(
                    state,
                    PartialFailure::new(
                        "chunk",
                        file.path.clone(),
                        format!("indexed as a single chunk: {reason}"),
                    ),
                );
            }
            tracing::debug!(path = %file.path, chunks = outcome.chunks.len(), "chunked file");
            chunks.extend(outcome.chunks);
        }
        state.stats.chunks = chunks.len();

        self.enter(state, Phase::Embedding, cancel).await?;
        let texts: Vec<String> = chunks.iter().map(contextualize_for_embedding).collect();
        let vectors = self.embedder.embed_batch(&texts, cancel).await?;

        let mut missing: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut embedded = Vec::with_capacity(chunks.len());
        for (mut chunk, vector) in chunks.into_iter().zip(vectors) {
            let entry = missing.entry(chunk.file_path.clone()).or_default();
            entry.1 += 1;
            match vector {
                Some(v) => {
                    chunk.embedding = Some(v);
                    embedded.push(chunk);
                }
                None => entry.0 += 1,
            }
        }
        for (path, (failed, total)) in missing {
            if failed > 0 {
                self.record_failure(
                    state,
                    PartialFailure::new(
                        "embed",
                        path,
                        format!("{failed} of {total} chunks could not be embedded"),
                    ),
                );
            }
        }
        state.stats.embeddings = embedded.len();

        // Storing is a full replace of the repository's chunks.
        self.enter(state, Phase::Storing, cancel).await?;
        let removed = self.store.delete_repository_chunks(&state.key).await?;
        let report = self.store.store_chunks(&state.key, embedded).await?;
        tracing::debug!(
            repo_key = %state.key,
            removed,
            stored = report.successful,
            failed = report.failed,
            "replaced repository chunks"
        );
        if report.failed > 0 {
            let failure = PartialFailure::new(
                "store",
                state.key.clone(),
                format!("{} chunks rejected by the store", report.failed),
            );
            self.record_failure(state, failure);
        }

        self.enter(state, Phase::Finalizing, cancel).await?;
        self.store
            .update_indexing_status(
                &state.key,
                StatusUpdate {
                    status: Some(JobStatus::Completed),
                    phase: Some(Phase::Finalizing),
                    progress_percent: Some(100),
                    stats: Some(state.stats),
                    error: None,
                },
            )
            .await?;

        Ok(IndexReport {
            repo_key: state.key.clone(),
            run_id: state.run_id,
            stats: state.stats,
            stored: report.successful,
            store_failed: report.failed,
            partial_failures: state.failures.clone(),
            duration_ms: 0,
        })
    }

    /// Move the job into `phase`, unless it was cancelled.
    async fn enter(
        &self,
        state: &RunState,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let stats = state.stats;
        self.transition(state, |j| {
            j.phase = phase;
            j.progress_percent = phase.progress();
            j.stats = stats;
        });
        tracing::info!(repo_key = %state.key, %phase, progress = phase.progress(), "phase started");
        self.store
            .update_indexing_status(
                &state.key,
                StatusUpdate {
                    phase: Some(phase),
                    progress_percent: Some(phase.progress()),
                    stats: Some(stats),
                    ..StatusUpdate::default()
                },
            )
            .await?;
        Ok(())
    }

    fn record_failure(&self, state: &mut RunState, failure: PartialFailure) {
        tracing::warn!(
            repo_key = %state.key,
            stage = %failure.stage,
            target = %failure.target,
            "partial failure: {}",
            failure.message
        );
        let recorded = failure.clone();
        self.jobs
            .update(&state.key, state.run_id, |j| j.partial_failures.push(recorded));
        state.failures.push(failure);
    }

    async fn fail(&self, state: &RunState, err: &IndexError) {
        let message = err.to_string();
        tracing::error!(repo_key = %state.key, "indexing failed: {message}");
        let stats = state.stats;
        let recorded = message.clone();
        self.transition(state, |j| {
            j.status = JobStatus::Failed;
            j.error = Some(recorded);
            j.stats = stats;
            j.finished_at = Some(chrono::Utc::now());
        });

        let update = StatusUpdate {
            status: Some(JobStatus::Failed),
            stats: Some(stats),
            error: Some(message),
            ..StatusUpdate::default()
        };
        if let Err(e) = self.store.update_indexing_status(&state.key, update).await {
            tracing::warn!(repo_key = %state.key, "failed to persist failure status: {e}");
        }
    }

    fn transition<F>(&self, state: &RunState, f: F)
    where
        F: FnOnce(&mut IndexingJob),
    {
        if let Some(job) = self.jobs.update(&state.key, state.run_id, f) {
            self.emit(&job);
        }
    }

    fn emit(&self, job: &IndexingJob) {
        if let Some(tx) = &self.events {
            let _ = tx.send(JobEvent::from(job));
        }
    }
}

impl<P: LlmProvider + 'static> IndexOrchestrator<P> {
    /// Register a job for `owner/repo` and run it on a background task.
    ///
    /// Conflict detection happens before this returns, so a second call for
    /// the same key fails even if the first job has not started yet. If the
    /// run panics the job is marked failed and the key is released.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Conflict` if a job for the key is in progress.
    pub fn start_indexing(
        self: &Arc<Self>,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<IndexHandle> {
        let (job, token) = self.register(owner, repo, branch)?;
        let this = Arc::clone(self);
        let snapshot = job.clone();
        let task = tokio::spawn(async move {
            let key = snapshot.id.clone();
            let run_id = snapshot.run_id;
            let worker = Arc::clone(&this);
            let run = tokio::spawn(async move { worker.run(snapshot, token).await });
            match run.await {
                Ok(result) => result,
                Err(e) => {
                    let err = IndexError::Task(e.to_string());
                    this.abandon(key, run_id, &err).await;
                    Err(err)
                }
            }
        });
        Ok(IndexHandle { job, task })
    }

    /// Terminal bookkeeping for a run whose task died before finishing.
    async fn abandon(&self, key: String, run_id: Uuid, err: &IndexError) {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        let (stats, failures) = self
            .jobs
            .get(&key)
            .filter(|j| j.run_id == run_id)
            .map(|j| (j.stats, j.partial_failures))
            .unwrap_or_default();
        let state = RunState {
            key,
            run_id,
            stats,
            failures,
        };
        self.fail(&state, err).await;
    }
}
