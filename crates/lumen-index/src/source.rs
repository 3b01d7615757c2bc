//! Repository file sources.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::error::SourceError;
use crate::languages::language_id_for_path;

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8000;

/// One file fetched from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub language: String,
    pub size: u64,
}

impl SourceFile {
    /// File with language inferred from its extension.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            language: language_id_for_path(Path::new(&path)),
            size: content.len() as u64,
            path,
            content,
        }
    }
}

/// A file that could not be fetched; recorded, never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub files: Vec<SourceFile>,
    pub failures: Vec<FetchFailure>,
}

/// Supplies a repository's files to the indexer.
pub trait FileSource: Send + Sync {
    /// Fetch every indexable file of `owner/repo` at `branch`.
    ///
    /// Individual unreadable files are reported in [`FetchResult::failures`];
    /// an `Err` means the repository as a whole could not be read.
    fn fetch_files(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> BoxFuture<'_, Result<FetchResult, SourceError>>;
}

/// Reads a local checkout, honouring `.gitignore` and skipping hidden,
/// binary and oversized files.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    root: PathBuf,
    max_file_bytes: u64,
}

impl LocalFileSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_one(&self, abs: &Path, rel: &str) -> Result<Option<SourceFile>, String> {
        let meta = tokio::fs::metadata(abs).await.map_err(|e| e.to_string())?;
        if meta.len() > self.max_file_bytes {
            tracing::debug!(path = rel, bytes = meta.len(), "skipping oversized file");
            return Ok(None);
        }

        let bytes = tokio::fs::read(abs).await.map_err(|e| e.to_string())?;
        if bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0) {
            tracing::debug!(path = rel, "skipping binary file");
            return Ok(None);
        }

        let content = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;
        Ok(Some(SourceFile {
            language: language_id_for_path(abs),
            size: meta.len(),
            path: rel.to_string(),
            content,
        }))
    }
}

/// Files under `root` in name order, plus entries the walk could not read.
fn walk(root: &Path) -> (Vec<PathBuf>, Vec<FetchFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();
    for entry in walker {
        match entry {
            Ok(e) if e.file_type().is_some_and(|ft| ft.is_file()) => files.push(e.into_path()),
            Ok(_) => {}
            Err(err) => {
                let failure = walk_failure(root, &err);
                tracing::warn!(path = %failure.path, "failed to walk: {}", failure.message);
                failures.push(failure);
            }
        }
    }
    (files, failures)
}

fn walk_failure(root: &Path, err: &ignore::Error) -> FetchFailure {
    FetchFailure {
        path: error_path(err).map_or_else(|| ".".to_string(), |p| relative(root, p)),
        message: err.to_string(),
    }
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

/// `abs` relative to `root`, `/`-separated.
fn relative(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root)
        .unwrap_or(abs)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl FileSource for LocalFileSource {
    fn fetch_files(
        &self,
        owner: &str,
        repo: &str,
        _branch: &str,
    ) -> BoxFuture<'_, Result<FetchResult, SourceError>> {
        let label = format!("{owner}/{repo}");
        Box::pin(async move {
            if !self.root.is_dir() {
                return Err(SourceError::NotFound(format!(
                    "{label} ({})",
                    self.root.display()
                )));
            }

            let root = self.root.clone();
            let (candidates, failures) = tokio::task::spawn_blocking(move || walk(&root))
                .await
                .map_err(|e| SourceError::Other(format!("directory walk failed: {e}")))?;

            let mut result = FetchResult {
                files: Vec::new(),
                failures,
            };
            for abs in candidates {
                let rel = relative(&self.root, &abs);
                match self.read_one(&abs, &rel).await {
                    Ok(Some(file)) => result.files.push(file),
                    Ok(None) => {}
                    Err(message) => {
                        tracing::warn!(path = %rel, "failed to read file: {message}");
                        result.failures.push(FetchFailure { path: rel, message });
                    }
                }
            }

            tracing::debug!(
                repo = %label,
                files = result.files.len(),
                failures = result.failures.len(),
                "local fetch complete"
            );
            Ok(result)
        })
    }
}
