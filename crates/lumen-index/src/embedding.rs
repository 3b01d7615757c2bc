//! Content-addressed embedding cache in front of an [`LlmProvider`].
//!
//! Texts are truncated, hashed with blake3 and looked up before any external
//! call. Misses are sent in fixed-size batches through [`with_retry`]; a batch
//! that still fails yields `None` for its entries instead of an error.
//!
//! The first caller to miss on a hash reserves an in-flight slot. Concurrent
//! callers asking for the same hash wait on that slot, so identical text is
//! never sent twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use lumen_llm::retry::{RetryPolicy, with_retry};
use lumen_llm::{LlmError, LlmProvider};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};

/// Character ceiling applied before hashing and embedding.
pub const MAX_EMBED_CHARS: usize = 24_000;

/// USD per million tokens for known embedding models.
const PRICES_PER_MILLION: &[(&str, f64)] = &[
    ("text-embedding-3-small", 0.02),
    ("text-embedding-3-large", 0.13),
    ("text-embedding-ada-002", 0.10),
];

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Texts per external call.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
    /// Expected vector length. When unset, the first vector received fixes it.
    pub dimensions: Option<usize>,
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_delay: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            dimensions: None,
            max_chars: MAX_EMBED_CHARS,
        }
    }
}

/// Running counters for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingUsage {
    /// Vectors handed back to callers, cached or not.
    pub total_embeddings: u64,
    pub cache_hits: u64,
    /// External attempts, retries included.
    pub api_calls: u64,
    pub tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Price of `tokens` for `model`; unknown models cost nothing.
#[must_use]
pub fn estimate_cost(model: &str, tokens: u64) -> f64 {
    PRICES_PER_MILLION
        .iter()
        .find(|(name, _)| *name == model)
        .map_or(0.0, |(_, price)| {
            #[allow(clippy::cast_precision_loss)]
            let tokens = tokens as f64;
            tokens / 1_000_000.0 * price
        })
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone)]
enum SlotState {
    Pending,
    Ready(Vec<f32>),
    Failed,
}

enum Slot {
    Ready(Vec<f32>),
    Pending(watch::Receiver<SlotState>),
}

type Cache = Mutex<HashMap<String, Slot>>;

/// Slots this caller must fill. Dropping it fails whatever is left so
/// waiters never hang.
struct Reservation<'a> {
    cache: &'a Cache,
    pending: HashMap<String, watch::Sender<SlotState>>,
}

impl Reservation<'_> {
    fn resolve(&mut self, key: &str, vector: &[f32]) {
        if let Some(tx) = self.pending.remove(key) {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), Slot::Ready(vector.to_vec()));
            let _ = tx.send(SlotState::Ready(vector.to_vec()));
        }
    }

    fn fail(&mut self, key: &str) {
        if let Some(tx) = self.pending.remove(key) {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
            let _ = tx.send(SlotState::Failed);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        for key in keys {
            self.fail(&key);
        }
    }
}

/// A text this caller owns the external call for.
struct Miss {
    key: String,
    text: String,
    index: usize,
}

pub struct EmbeddingClient<P: LlmProvider> {
    provider: Arc<P>,
    config: EmbeddingConfig,
    cache: Cache,
    usage: Mutex<EmbeddingUsage>,
    dimensions: OnceLock<usize>,
}

impl<P: LlmProvider> std::fmt::Debug for EmbeddingClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.embedding_model())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> EmbeddingClient<P> {
    /// # Errors
    ///
    /// Returns `IndexError::Validation` for a zero batch size or character
    /// ceiling.
    pub fn new(provider: Arc<P>, config: EmbeddingConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(IndexError::Validation("batch_size must be > 0".into()));
        }
        if config.max_chars == 0 {
            return Err(IndexError::Validation("max_chars must be > 0".into()));
        }
        let dimensions = OnceLock::new();
        if let Some(d) = config.dimensions {
            let _ = dimensions.set(d);
        }
        Ok(Self {
            provider,
            config,
            cache: Mutex::new(HashMap::new()),
            usage: Mutex::new(EmbeddingUsage::default()),
            dimensions,
        })
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    #[must_use]
    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    #[must_use]
    pub fn usage(&self) -> EmbeddingUsage {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cached vectors, in-flight slots included.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every finished cache entry. In-flight slots are kept.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, slot| matches!(slot, Slot::Pending(_)));
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Llm` when the service could not produce a vector
    /// after retries.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self
            .embed_batch(&[text.to_string()], &CancellationToken::new())
            .await?;
        out.pop().flatten().ok_or_else(|| {
            IndexError::Llm(LlmError::Other(
                "embedding service failed after retries".into(),
            ))
        })
    }

    /// Embed `texts`, preserving order. Entries whose batch failed are `None`.
    ///
    /// # Errors
    ///
    /// Only `IndexError::Cancelled`; service failures degrade to `None`.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<Vec<f32>>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses = Vec::new();
        let mut waiters = Vec::new();
        let mut reservation = Reservation {
            cache: &self.cache,
            pending: HashMap::new(),
        };
        let mut hits = 0u64;

        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for (index, raw) in texts.iter().enumerate() {
                let text = truncate_chars(raw, self.config.max_chars);
                if text.len() < raw.len() {
                    tracing::warn!(
                        chars = raw.chars().count(),
                        limit = self.config.max_chars,
                        "truncating text before embedding"
                    );
                }
                let key = content_hash(text);
                match cache.get(&key) {
                    Some(Slot::Ready(vector)) => {
                        results[index] = Some(vector.clone());
                        hits += 1;
                    }
                    Some(Slot::Pending(rx)) => waiters.push((index, rx.clone())),
                    None => {
                        let (tx, rx) = watch::channel(SlotState::Pending);
                        cache.insert(key.clone(), Slot::Pending(rx));
                        reservation.pending.insert(key.clone(), tx);
                        misses.push(Miss {
                            key,
                            text: text.to_string(),
                            index,
                        });
                    }
                }
            }
        }

        for (n, batch) in misses.chunks(self.config.batch_size).enumerate() {
            if n > 0 && !self.config.batch_delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(IndexError::Cancelled),
                    () = tokio::time::sleep(self.config.batch_delay) => {}
                }
            }
            match self.call_service(batch, cancel).await {
                Ok(vectors) => {
                    for (miss, vector) in batch.iter().zip(vectors) {
                        reservation.resolve(&miss.key, &vector);
                        results[miss.index] = Some(vector);
                    }
                }
                Err(LlmError::Cancelled) => return Err(IndexError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        batch = n,
                        size = batch.len(),
                        "embedding batch failed after retries: {e}"
                    );
                    for miss in batch {
                        reservation.fail(&miss.key);
                    }
                }
            }
        }
        drop(reservation);

        for (index, mut rx) in waiters {
            let state = tokio::select! {
                () = cancel.cancelled() => return Err(IndexError::Cancelled),
                res = rx.wait_for(|s| !matches!(s, SlotState::Pending)) => {
                    res.map(|s| s.clone()).unwrap_or(SlotState::Failed)
                }
            };
            if let SlotState::Ready(vector) = state {
                results[index] = Some(vector);
                hits += 1;
            }
        }

        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        usage.cache_hits += hits;
        usage.total_embeddings += results.iter().filter(|r| r.is_some()).count() as u64;
        Ok(results)
    }

    async fn call_service(
        &self,
        batch: &[Miss],
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let owned: Vec<String> = batch.iter().map(|m| m.text.clone()).collect();
        let texts: &[String] = &owned;
        let provider: &P = self.provider.as_ref();
        let usage = &self.usage;

        let response = with_retry("embedding batch", &self.config.retry, cancel, move |_| {
            usage
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .api_calls += 1;
            provider.embed_batch(texts)
        })
        .await?;

        if response.vectors.len() != texts.len() {
            return Err(LlmError::EmbeddingCount {
                expected: texts.len(),
                actual: response.vectors.len(),
            });
        }
        if response.vectors.iter().any(Vec::is_empty) {
            return Err(LlmError::Other(
                "embedding service returned an empty vector".into(),
            ));
        }
        let expected = *self
            .dimensions
            .get_or_init(|| response.vectors.first().map_or(0, Vec::len));
        if let Some(bad) = response.vectors.iter().find(|v| v.len() != expected) {
            return Err(LlmError::Other(format!(
                "vector dimension mismatch: expected {expected}, got {}",
                bad.len()
            )));
        }

        let tokens = response.usage.total_tokens;
        {
            let mut usage = usage.lock().unwrap_or_else(PoisonError::into_inner);
            usage.tokens += tokens;
            usage.estimated_cost_usd += estimate_cost(provider.embedding_model(), tokens);
        }
        tracing::debug!(
            size = texts.len(),
            tokens,
            model = provider.embedding_model(),
            "embedded batch"
        );
        Ok(response.vectors)
    }
}
