mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use lumen_index::{ChunkerConfig, EmbeddingConfig, QueryConfig};
use lumen_llm::retry::RetryPolicy;

pub use crate::error::ConfigError;
use crate::vault::{Secret, VaultProvider};

/// Environment variable holding the OpenAI-compatible API key.
pub const OPENAI_API_KEY_VAR: &str = "LUMEN_OPENAI_API_KEY";

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve sensitive configuration values through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        if let Some(val) = vault.get_secret(OPENAI_API_KEY_VAR).await? {
            self.secrets.openai_api_key = Some(Secret::new(val));
        }
        Ok(())
    }

    /// Check budgets, batching, the search threshold, and the API key.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        match &self.secrets.openai_api_key {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingSecret(OPENAI_API_KEY_VAR)),
        }
    }

    /// Everything [`Config::validate`] checks except secrets.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.max_chunk_size == 0 {
            return Err(invalid("chunking.max_chunk_size", "must be positive"));
        }
        if chunking.min_chunk_size >= chunking.max_chunk_size {
            return Err(invalid(
                "chunking.min_chunk_size",
                format!(
                    "{} must be below max_chunk_size {}",
                    chunking.min_chunk_size, chunking.max_chunk_size
                ),
            ));
        }
        if chunking.overlap_size >= chunking.max_chunk_size {
            return Err(invalid(
                "chunking.overlap_size",
                format!(
                    "{} must be below max_chunk_size {}",
                    chunking.overlap_size, chunking.max_chunk_size
                ),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be positive"));
        }
        if self.embedding.max_chars == 0 {
            return Err(invalid("embedding.max_chars", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(invalid(
                "search.threshold",
                format!("{} is outside [0, 1]", self.search.threshold),
            ));
        }
        if self.search.limit == 0 {
            return Err(invalid("search.limit", "must be positive"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(invalid("llm.base_url", "must not be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            min_chunk_size: self.chunking.min_chunk_size,
            max_chunk_size: self.chunking.max_chunk_size,
            overlap_size: self.chunking.overlap_size,
        }
    }

    #[must_use]
    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size: self.embedding.batch_size,
            batch_delay: Duration::from_millis(self.embedding.batch_delay_ms),
            retry: RetryPolicy {
                max_retries: self.embedding.max_retries,
                base_delay: Duration::from_millis(self.embedding.retry_delay_ms),
                call_timeout: Some(Duration::from_secs(self.llm.timeout_secs)),
            },
            dimensions: self
                .llm
                .embedding_dimensions
                .and_then(|d| usize::try_from(d).ok()),
            max_chars: self.embedding.max_chars,
        }
    }

    #[must_use]
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            threshold: self.search.threshold,
            limit: self.search.limit,
        }
    }
}
