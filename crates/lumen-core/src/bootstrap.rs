//! Application bootstrap: config resolution, provider and pipeline construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lumen_index::{
    ChunkStore, Chunker, EmbeddingClient, FileSource, InMemoryChunkStore, IndexOrchestrator,
    LocalFileSource, QueryEngine,
};
use lumen_llm::LlmProvider;
use lumen_llm::openai::OpenAiProvider;

use crate::config::{Config, OPENAI_API_KEY_VAR};
use crate::vault::{EnvVaultProvider, VaultProvider};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "LUMEN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path, load it, resolve secrets from the environment
    /// and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or fails validation.
    pub async fn from_env(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::with_vault(explicit, &EnvVaultProvider).await
    }

    /// Like [`AppBuilder::from_env`] with a caller-supplied secret backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or fails validation.
    pub async fn with_vault(
        explicit: Option<&Path>,
        vault: &dyn VaultProvider,
    ) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(explicit);
        let mut config = Config::load(&config_path)?;
        config.resolve_secrets(vault).await?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        tracing::debug!(path = %config_path.display(), "configuration loaded");

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// Returns an error if the API key is missing.
    pub fn build_provider(&self) -> anyhow::Result<OpenAiProvider> {
        create_provider(&self.config)
    }

    /// Wire an in-memory pipeline over a local checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking or embedding settings are rejected.
    pub fn build_local_pipeline<P: LlmProvider>(
        &self,
        provider: Arc<P>,
        root: impl Into<PathBuf>,
    ) -> anyhow::Result<Pipeline<P>> {
        let source = Arc::new(LocalFileSource::new(
            root,
            self.config.source.max_file_bytes,
        ));
        build_pipeline(&self.config, provider, source)
    }
}

/// Indexing and querying halves sharing one store and embedding cache.
pub struct Pipeline<P: LlmProvider> {
    pub orchestrator: Arc<IndexOrchestrator<P>>,
    pub engine: QueryEngine<P>,
}

impl<P: LlmProvider> Pipeline<P> {
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        self.orchestrator.store()
    }
}

/// Build the orchestrator and query engine from `config`.
///
/// # Errors
///
/// Returns an error if the chunking or embedding settings are rejected.
pub fn build_pipeline<P: LlmProvider>(
    config: &Config,
    provider: Arc<P>,
    source: Arc<dyn FileSource>,
) -> anyhow::Result<Pipeline<P>> {
    let chunker = Chunker::new(config.chunker_config()).context("invalid chunking settings")?;
    let embedder = Arc::new(
        EmbeddingClient::new(provider, config.embedding_config())
            .context("invalid embedding settings")?,
    );
    let store: Arc<dyn ChunkStore> = match config.llm.embedding_dimensions {
        Some(dims) => Arc::new(
            InMemoryChunkStore::new()
                .with_dimensions(usize::try_from(dims).context("embedding_dimensions out of range")?),
        ),
        None => Arc::new(InMemoryChunkStore::new()),
    };

    let orchestrator = Arc::new(IndexOrchestrator::new(
        source,
        Arc::clone(&store),
        Arc::clone(&embedder),
        chunker,
    ));
    let engine = QueryEngine::new(embedder, store, config.query_config());
    Ok(Pipeline {
        orchestrator,
        engine,
    })
}

/// Priority: explicit path, then `LUMEN_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// # Errors
///
/// Returns an error if no API key was resolved.
pub fn create_provider(config: &Config) -> anyhow::Result<OpenAiProvider> {
    let api_key = config
        .secrets
        .openai_api_key
        .as_ref()
        .with_context(|| format!("{OPENAI_API_KEY_VAR} is not set"))?
        .expose()
        .to_owned();
    let llm = &config.llm;
    let mut provider = OpenAiProvider::new(
        api_key,
        llm.base_url.clone(),
        llm.model.clone(),
        llm.max_tokens,
        llm.embedding_model.clone(),
    )
    .with_client(lumen_llm::http::default_client(Duration::from_secs(
        llm.timeout_secs,
    )));
    if let Some(dims) = llm.embedding_dimensions {
        provider = provider.with_dimensions(dims);
    }
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use lumen_index::{Confidence, QueryFilters};
    use lumen_llm::mock::MockProvider;
    use serial_test::serial;

    use super::*;
    use crate::vault::{MockVaultProvider, Secret};

    fn config_with_key() -> Config {
        let mut config = Config::default();
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        config.chunking.min_chunk_size = 5;
        config.embedding.batch_delay_ms = 0;
        config
    }

    #[test]
    #[serial]
    fn config_path_prefers_explicit_then_env() {
        unsafe { std::env::set_var(CONFIG_PATH_VAR, "/etc/lumen.toml") };
        assert_eq!(
            resolve_config_path(Some(Path::new("custom.toml"))),
            PathBuf::from("custom.toml")
        );
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/lumen.toml"));
        unsafe { std::env::remove_var(CONFIG_PATH_VAR) };
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn provider_requires_api_key() {
        let err = create_provider(&Config::default()).unwrap_err();
        assert!(err.to_string().contains(OPENAI_API_KEY_VAR));
        assert!(create_provider(&config_with_key()).is_ok());
    }

    #[test]
    fn provider_debug_hides_key() {
        let provider = create_provider(&config_with_key()).unwrap();
        assert!(!format!("{provider:?}").contains("sk-test"));
    }

    #[tokio::test]
    #[serial]
    async fn builder_loads_and_validates() {
        unsafe { std::env::remove_var(CONFIG_PATH_VAR) };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumen.toml");
        std::fs::write(&path, "[search]\nlimit = 4\n").unwrap();

        let vault = MockVaultProvider::new().with_secret(OPENAI_API_KEY_VAR, "sk-abc");
        let builder = AppBuilder::with_vault(Some(&path), &vault).await.unwrap();
        assert_eq!(builder.config_path(), path);
        assert_eq!(builder.config().search.limit, 4);
        assert!(builder.build_provider().is_ok());

        let err = AppBuilder::with_vault(Some(&path), &MockVaultProvider::new())
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("missing secret"));
    }

    #[tokio::test]
    async fn pipeline_shares_store_between_indexer_and_engine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ledger.py"),
            "def post_ledger_entry(account, amount):\n    \
             account.balance += amount\n    \
             return account.balance\n",
        )
        .unwrap();

        let provider = Arc::new(MockProvider::with_responses(vec![
            "Entries update the balance.".into(),
        ]));
        let mut config = config_with_key();
        config.search.threshold = 0.2;
        let pipeline = build_pipeline(
            &config,
            Arc::clone(&provider),
            Arc::new(LocalFileSource::new(dir.path(), 1 << 20)),
        )
        .unwrap();

        pipeline
            .orchestrator
            .index_repository("acme", "ledger", "main")
            .await
            .unwrap();
        assert_eq!(
            pipeline.store().list_indexed_repositories().await.unwrap(),
            ["acme/ledger"]
        );

        let result = pipeline
            .engine
            .query("post ledger entry balance", &QueryFilters::default())
            .await
            .unwrap();
        assert_eq!(result.answer, "Entries update the balance.");
        assert_ne!(result.confidence, Confidence::None);
    }

    #[test]
    fn invalid_chunking_is_rejected() {
        let mut config = config_with_key();
        config.chunking.overlap_size = config.chunking.max_chunk_size;
        let result = build_pipeline(
            &config,
            Arc::new(MockProvider::default()),
            Arc::new(LocalFileSource::new(".", 1024)),
        );
        assert!(result.is_err());
    }
}
