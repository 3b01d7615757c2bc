//! Question answering over indexed code: embed, retrieve, synthesize, cite.

use std::sync::Arc;
use std::time::Instant;

use lumen_llm::provider::{LlmProvider, Message};
use serde::{Deserialize, Serialize};

use crate::chunker::ChunkType;
use crate::context::format_as_context;
use crate::embedding::EmbeddingClient;
use crate::error::{IndexError, Result};
use crate::intent::{self, Capability};
use crate::store::{ChunkStore, ScoredChunk, SearchFilter};

/// Answer returned when retrieval finds nothing above the threshold.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any code relevant to your question in the \
     indexed repositories. Try rephrasing it, lowering the similarity threshold, or indexing \
     the repository first.";

const BUSINESS_PROMPT: &str = "You explain a software codebase to people who do not write code. \
     Explain in business terms: what the code does for users and for the business, which \
     rules it enforces, and what could go wrong. Avoid jargon. Mention file paths only as \
     references. Answer only from the provided code context and say so when it is not enough.";

const TECHNICAL_PROMPT: &str = "You are a senior engineer explaining a codebase to a colleague. \
     Explain technically: reference functions, types, data flow and file paths. Answer only \
     from the provided code context and say so when it is not enough.";

/// Audience the answer is written for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Business,
    Technical,
}

impl Role {
    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Business => BUSINESS_PROMPT,
            Self::Technical => TECHNICAL_PROMPT,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "business" => Ok(Self::Business),
            "technical" => Ok(Self::Technical),
            other => Err(IndexError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Coarse reliability label derived from the number of retrieved chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    #[must_use]
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::Low,
            2..=4 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Per-query overrides. Unset fields fall back to the engine defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub repo: Option<String>,
    pub language: Option<String>,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryConfig {
    pub threshold: f32,
    pub limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            limit: 10,
        }
    }
}

/// A chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub repo_key: String,
    pub file_path: String,
    pub chunk_type: ChunkType,
    pub chunk_name: String,
    pub similarity: f32,
    pub start_line: usize,
    pub end_line: usize,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            repo_key: scored.repo_key.clone(),
            file_path: scored.chunk.file_path.clone(),
            chunk_type: scored.chunk.chunk_type,
            chunk_name: scored.chunk.name.clone(),
            similarity: scored.similarity,
            start_line: scored.chunk.start_line,
            end_line: scored.chunk.end_line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer: String,
    pub confidence: Confidence,
    pub sources: Vec<Source>,
    pub processing_time_ms: u64,
    pub intents: Vec<Capability>,
    /// Terms pulled from the question, for keyword follow-up searches.
    pub search_terms: Vec<String>,
    /// Path globs where the answer probably lives; advisory, not a filter.
    pub file_patterns: Vec<String>,
}

pub struct QueryEngine<P: LlmProvider> {
    embedder: Arc<EmbeddingClient<P>>,
    store: Arc<dyn ChunkStore>,
    config: QueryConfig,
}

impl<P: LlmProvider> std::fmt::Debug for QueryEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> QueryEngine<P> {
    #[must_use]
    pub fn new(
        embedder: Arc<EmbeddingClient<P>>,
        store: Arc<dyn ChunkStore>,
        config: QueryConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Ranked chunks for `question`: `similarity >= threshold`, most similar
    /// first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty question or a threshold outside `[0, 1]`,
    /// or when embedding or the store fails.
    pub async fn retrieve(&self, question: &str, filters: &QueryFilters) -> Result<Vec<ScoredChunk>> {
        if question.trim().is_empty() {
            return Err(IndexError::Validation("question must not be empty".into()));
        }
        let threshold = filters.threshold.unwrap_or(self.config.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(IndexError::Validation(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        let limit = filters.limit.unwrap_or(self.config.limit);

        let vector = self.embedder.embed(question).await?;
        let mut hits = self
            .store
            .search_chunks(
                vector,
                SearchFilter {
                    repo: filters.repo.clone(),
                    language: filters.language.clone(),
                    threshold,
                    limit,
                },
            )
            .await?;

        hits.retain(|h| h.similarity >= threshold);
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Answer `question` from retrieved code.
    ///
    /// With no relevant chunks the canned [`NO_RESULTS_ANSWER`] is returned
    /// and the completion service is not called.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails or the completion service fails.
    pub async fn query(&self, question: &str, filters: &QueryFilters) -> Result<QueryResult> {
        let started = Instant::now();
        let intent = intent::analyze(question);
        let hits = self.retrieve(question, filters).await?;

        tracing::info!(
            hits = hits.len(),
            repo = filters.repo.as_deref().unwrap_or("*"),
            intents = ?intent.capabilities,
            "retrieved code for question"
        );

        if hits.is_empty() {
            return Ok(QueryResult {
                answer: NO_RESULTS_ANSWER.to_string(),
                confidence: Confidence::None,
                sources: Vec::new(),
                processing_time_ms: elapsed_ms(started),
                intents: intent.capabilities,
                search_terms: intent.search_terms,
                file_patterns: intent.file_patterns,
            });
        }

        let system = format!("{} {}", filters.role.system_prompt(), intent.prompt_hint());
        let user = format!("Question: {question}\n\n{}", format_as_context(&hits));
        let answer = self
            .embedder
            .provider()
            .chat(&[Message::system(system), Message::user(user)])
            .await?;

        Ok(QueryResult {
            answer,
            confidence: Confidence::from_count(hits.len()),
            sources: hits.iter().map(Source::from).collect(),
            processing_time_ms: elapsed_ms(started),
            intents: intent.capabilities,
            search_terms: intent.search_terms,
            file_patterns: intent.file_patterns,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use lumen_llm::mock::MockProvider;
    use lumen_llm::provider::Role as MessageRole;

    use super::*;
    use crate::chunker::Chunk;
    use crate::embedding::EmbeddingConfig;
    use crate::in_memory_store::InMemoryChunkStore;

    fn chunk(path: &str, name: &str, content: &str) -> Chunk {
        Chunk {
            content: content.into(),
            chunk_type: ChunkType::Function,
            name: name.into(),
            estimated_tokens: content.len() / 4,
            start_line: 1,
            end_line: 10,
            language: "rust".into(),
            file_path: path.into(),
            chunk_index: 0,
            total_chunks_in_file: 1,
            embedding: None,
        }
    }

    async fn engine_with(
        provider: MockProvider,
        chunks: Vec<Chunk>,
    ) -> QueryEngine<MockProvider> {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = chunks
            .into_iter()
            .map(|mut c| {
                c.embedding = Some(provider.vector_for(&c.content));
                c
            })
            .collect();
        store.store_chunks("acme/repo", chunks).await.unwrap();
        let embedder =
            Arc::new(EmbeddingClient::new(Arc::new(provider), EmbeddingConfig::default()).unwrap());
        QueryEngine::new(embedder, store, QueryConfig::default())
    }

    #[test]
    fn confidence_tiers() {
        assert_eq!(Confidence::from_count(0), Confidence::None);
        assert_eq!(Confidence::from_count(1), Confidence::Low);
        assert_eq!(Confidence::from_count(2), Confidence::Medium);
        assert_eq!(Confidence::from_count(4), Confidence::Medium);
        assert_eq!(Confidence::from_count(5), Confidence::High);
        assert_eq!(Confidence::from_count(50), Confidence::High);
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Technical".parse::<Role>().unwrap(), Role::Technical);
        assert!("manager".parse::<Role>().is_err());
    }

    #[tokio::test]
    async fn nothing_relevant_skips_completion() {
        let provider = MockProvider::default();
        let engine = engine_with(
            provider.clone(),
            vec![chunk("src/math.rs", "transpose", "matrix transpose rows columns")],
        )
        .await;

        let result = engine
            .query("invoice payment reminder email", &QueryFilters::default())
            .await
            .unwrap();
        assert_eq!(result.answer, NO_RESULTS_ANSWER);
        assert_eq!(result.confidence, Confidence::None);
        assert!(result.sources.is_empty());
        assert_eq!(provider.chat_calls(), 0);
    }

    #[tokio::test]
    async fn result_carries_search_terms_and_file_patterns() {
        let engine = engine_with(
            MockProvider::default(),
            vec![chunk("src/math.rs", "transpose", "matrix transpose rows columns")],
        )
        .await;
        let result = engine
            .query("where is the auth token refresh service", &QueryFilters::default())
            .await
            .unwrap();

        assert_eq!(result.intents, [Capability::CodeSearch]);
        assert_eq!(result.search_terms, ["auth", "token", "refresh", "service"]);
        assert_eq!(
            result.file_patterns,
            ["**/services/**", "**/api/**", "**/auth/**", "**/security/**"]
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["searchTerms"][0], "auth");
        assert_eq!(json["filePatterns"][2], "**/auth/**");
    }

    #[tokio::test]
    async fn answers_with_sorted_citations() {
        let provider = MockProvider::with_responses(vec!["Users log in with a password.".into()]);
        let engine = engine_with(
            provider.clone(),
            vec![
                chunk("src/auth.rs", "login", "user login password session"),
                chunk("src/session.rs", "refresh", "user login session token refresh"),
                chunk("src/math.rs", "transpose", "matrix transpose rows columns"),
            ],
        )
        .await;

        let filters = QueryFilters {
            threshold: Some(0.3),
            ..QueryFilters::default()
        };
        let result = engine.query("user login password", &filters).await.unwrap();

        assert_eq!(result.answer, "Users log in with a password.");
        assert_eq!(result.sources[0].file_path, "src/auth.rs");
        assert!(result.sources.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(result.sources.iter().all(|s| s.similarity >= 0.3));
        assert!(result.sources.iter().all(|s| s.file_path != "src/math.rs"));
        assert_eq!(
            result.confidence,
            Confidence::from_count(result.sources.len())
        );

        let sent = provider.last_chat();
        assert_eq!(sent[0].role, MessageRole::System);
        assert!(sent[0].content.starts_with(BUSINESS_PROMPT));
        assert!(sent[1].content.contains("<code_context>"));
        assert!(sent[1].content.contains("src/auth.rs"));
    }

    #[tokio::test]
    async fn technical_role_changes_system_prompt() {
        let provider = MockProvider::default();
        let engine = engine_with(
            provider.clone(),
            vec![chunk("src/auth.rs", "login", "user login password")],
        )
        .await;
        let filters = QueryFilters {
            role: Role::Technical,
            threshold: Some(0.1),
            ..QueryFilters::default()
        };
        engine.query("explain user login", &filters).await.unwrap();
        let sent = provider.last_chat();
        assert!(sent[0].content.starts_with(TECHNICAL_PROMPT));
        assert!(sent[0].content.contains(Capability::ExplainCode.hint()));
    }

    #[tokio::test]
    async fn completion_failure_is_hard_error() {
        let provider = MockProvider::failing();
        let engine = engine_with(
            provider,
            vec![chunk("src/auth.rs", "login", "user login password")],
        )
        .await;
        let filters = QueryFilters {
            threshold: Some(0.1),
            ..QueryFilters::default()
        };
        let err = engine.query("user login", &filters).await.unwrap_err();
        assert!(matches!(err, IndexError::Llm(_)));
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let provider = MockProvider::default();
        let chunks = (0..8)
            .map(|i| chunk(&format!("src/f{i}.rs"), "login", "user login password"))
            .collect();
        let engine = engine_with(provider, chunks).await;
        let filters = QueryFilters {
            limit: Some(3),
            threshold: Some(0.5),
            ..QueryFilters::default()
        };
        let hits = engine.retrieve("user login password", &filters).await.unwrap();
        assert_eq!(hits.len(), 3);

        let result = engine
            .query(
                "user login password",
                &QueryFilters {
                    threshold: Some(0.5),
                    ..QueryFilters::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.sources.len(), 8);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn rejects_empty_question_and_bad_threshold() {
        let engine = engine_with(MockProvider::default(), vec![]).await;
        assert!(matches!(
            engine.query("   ", &QueryFilters::default()).await,
            Err(IndexError::Validation(_))
        ));
        let filters = QueryFilters {
            threshold: Some(1.5),
            ..QueryFilters::default()
        };
        assert!(matches!(
            engine.query("login", &filters).await,
            Err(IndexError::Validation(_))
        ));
    }
}
