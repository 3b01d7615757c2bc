use std::str::FromStr;

use super::Config;

/// Read and parse `key`, ignoring unset variables and warning on bad values.
fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(value) = raw.trim().parse() {
        Some(value)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("LUMEN_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LUMEN_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LUMEN_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(dims) = parse_env::<u32>("LUMEN_LLM_EMBEDDING_DIMENSIONS") {
            self.llm.embedding_dimensions = (dims > 0).then_some(dims);
        }
        if let Some(tokens) = parse_env("LUMEN_LLM_MAX_TOKENS") {
            self.llm.max_tokens = tokens;
        }
        if let Some(secs) = parse_env("LUMEN_TIMEOUT_LLM") {
            self.llm.timeout_secs = secs;
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Some(n) = parse_env("LUMEN_CHUNK_MIN_SIZE") {
            self.chunking.min_chunk_size = n;
        }
        if let Some(n) = parse_env("LUMEN_CHUNK_MAX_SIZE") {
            self.chunking.max_chunk_size = n;
        }
        if let Some(n) = parse_env("LUMEN_CHUNK_OVERLAP") {
            self.chunking.overlap_size = n;
        }
        if let Some(n) = parse_env("LUMEN_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = n;
        }
        if let Some(ms) = parse_env("LUMEN_EMBEDDING_BATCH_DELAY_MS") {
            self.embedding.batch_delay_ms = ms;
        }
        if let Some(n) = parse_env("LUMEN_EMBEDDING_MAX_RETRIES") {
            self.embedding.max_retries = n;
        }
        if let Some(ms) = parse_env("LUMEN_EMBEDDING_RETRY_DELAY_MS") {
            self.embedding.retry_delay_ms = ms;
        }
        if let Some(threshold) = parse_env("LUMEN_SEARCH_THRESHOLD") {
            self.search.threshold = threshold;
        }
        if let Some(limit) = parse_env("LUMEN_SEARCH_LIMIT") {
            self.search.limit = limit;
        }
        if let Some(bytes) = parse_env("LUMEN_SOURCE_MAX_FILE_BYTES") {
            self.source.max_file_bytes = bytes;
        }
    }
}
