use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lumen_core::bootstrap::{AppBuilder, Pipeline};
use lumen_index::{IndexReport, QueryFilters, Role};
use lumen_llm::LlmProvider;

/// Index a local checkout and ask questions about it.
#[derive(Debug, Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Config file (falls back to LUMEN_CONFIG, then config/default.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct RepoArgs {
    /// Directory to index.
    path: PathBuf,
    #[arg(long, default_value = "local")]
    owner: String,
    /// Defaults to the directory name.
    #[arg(long)]
    repo: Option<String>,
    #[arg(long, default_value = "main")]
    branch: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a directory and print the report as JSON.
    Index {
        #[command(flatten)]
        target: RepoArgs,
    },
    /// Index a directory, then answer a question about it.
    Ask {
        #[command(flatten)]
        target: RepoArgs,
        question: String,
        /// business or technical
        #[arg(long, default_value = "business")]
        role: Role,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl RepoArgs {
    fn repo_name(&self) -> String {
        self.repo.clone().unwrap_or_else(|| dir_name(&self.path))
    }
}

fn dir_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map_or_else(|| "repo".to_owned(), |n| n.to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let builder = AppBuilder::from_env(cli.config.as_deref()).await?;
    let provider = Arc::new(builder.build_provider()?);

    match cli.command {
        Command::Index { target } => {
            let pipeline = builder.build_local_pipeline(provider, &target.path)?;
            let report = index(&pipeline, &target).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ask {
            target,
            question,
            role,
            language,
            threshold,
            limit,
        } => {
            let pipeline = builder.build_local_pipeline(provider, &target.path)?;
            let report = index(&pipeline, &target).await?;
            let filters = QueryFilters {
                repo: Some(report.repo_key),
                language,
                threshold,
                limit,
                role,
            };
            let result = pipeline
                .engine
                .query(&question, &filters)
                .await
                .context("query failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

/// Run one indexing job, cancelling it on Ctrl-C.
async fn index<P: LlmProvider + 'static>(
    pipeline: &Pipeline<P>,
    target: &RepoArgs,
) -> anyhow::Result<IndexReport> {
    let repo = target.repo_name();
    let orchestrator = &pipeline.orchestrator;
    let handle = orchestrator.start_indexing(&target.owner, &repo, &target.branch)?;
    tracing::info!(run_id = %handle.job().run_id, path = %target.path.display(), "indexing started");

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, cancelling indexing");
            orchestrator.cancel(&target.owner, &repo);
            wait.await
        }
    };
    let report = result.with_context(|| format!("indexing {}/{repo} failed", target.owner))?;

    let usage = orchestrator.embedder().usage();
    tracing::info!(
        chunks = report.stored,
        api_calls = usage.api_calls,
        cache_hits = usage.cache_hits,
        cost_usd = usage.estimated_cost_usd,
        "indexing finished"
    );
    Ok(report)
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
