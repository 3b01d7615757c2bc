//! Test-only mock LLM provider.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{EmbedResponse, LlmProvider, Message, Usage};

/// Deterministic in-process provider.
///
/// Embeddings are bag-of-words vectors: every lowercase alphanumeric word is
/// hashed into one of `dimensions` buckets and the result is L2-normalized, so
/// texts sharing vocabulary score high under cosine similarity.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dimensions: usize,
    pub fail_chat: bool,
    /// Milliseconds to sleep before answering either call.
    pub delay_ms: u64,
    embed_failures_left: Arc<AtomicU32>,
    fail_marker: Option<String>,
    embed_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    embedded: Arc<Mutex<Vec<String>>>,
    last_chat: Arc<Mutex<Vec<Message>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            dimensions: 64,
            fail_chat: false,
            delay_ms: 0,
            embed_failures_left: Arc::new(AtomicU32::new(0)),
            fail_marker: None,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embedded: Arc::new(Mutex::new(Vec::new())),
            last_chat: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Fail the next `n` embedding calls with a retryable error.
    #[must_use]
    pub fn fail_embed_times(self, n: u32) -> Self {
        self.embed_failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every embedding call whose batch contains `marker`.
    #[must_use]
    pub fn fail_on_marker(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Every text sent to `embed_batch`, in call order.
    #[must_use]
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().unwrap().clone()
    }

    #[must_use]
    pub fn last_chat(&self) -> Vec<Message> {
        self.last_chat.lock().unwrap().clone()
    }

    /// The vector `embed_batch` produces for `text`.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1);
        let mut v = vec![0.0f32; dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % dims as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_chat.lock().unwrap() = messages.to_vec();
        self.pause().await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbedResponse, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.embedded.lock().unwrap().extend(texts.iter().cloned());
        self.pause().await;

        let should_fail = self
            .embed_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(LlmError::RateLimited);
        }
        if let Some(marker) = &self.fail_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Api {
                provider: "mock",
                status: 503,
                message: "mock embedding failure".into(),
            });
        }

        let tokens = texts.iter().map(|t| t.chars().count() as u64 / 4).sum();
        Ok(EmbedResponse {
            vectors: texts.iter().map(|t| self.vector_for(t)).collect(),
            usage: Usage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn embedding_model(&self) -> &str {
        "mock-embedding"
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
