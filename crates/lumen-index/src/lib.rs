//! Code indexing and semantic retrieval.
//!
//! Source files are split into bounded chunks by lightweight per-language
//! heuristics, embedded through a content-addressed cache, stored behind the
//! [`store::ChunkStore`] interface, and retrieved by cosine similarity to
//! answer questions through a completion model.

use std::future::Future;
use std::pin::Pin;

pub mod chunker;
pub mod context;
pub mod embedding;
pub mod error;
pub mod in_memory_store;
pub mod indexer;
pub mod intent;
pub mod job;
pub mod languages;
pub mod query;
pub mod source;
pub mod store;
pub mod strategy;

/// Boxed future returned by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use chunker::{Chunk, ChunkOutcome, ChunkType, Chunker, ChunkerConfig};
pub use embedding::{EmbeddingClient, EmbeddingConfig, EmbeddingUsage};
pub use error::{ChunkError, IndexError, PartialFailure, Result};
pub use in_memory_store::InMemoryChunkStore;
pub use indexer::{IndexHandle, IndexOrchestrator, IndexReport};
pub use job::{IndexingJob, JobEvent, JobStatus, Phase};
pub use query::{Confidence, QueryConfig, QueryEngine, QueryFilters, QueryResult, Role};
pub use source::{FileSource, LocalFileSource, SourceFile};
pub use store::ChunkStore;
