//! Oncomatch — clinical trial matching over a patient snapshot.
//! Entry point for the `oncomatch` binary.

mod export;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use oncomatch_common::MatchConfig;
use oncomatch_engine::{MatchEngine, Oncotree};
use oncomatch_store::{loader, MemoryStore, Store};

#[derive(Parser)]
#[command(name = "oncomatch", version, about = "Match patients to clinical trials")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and load snapshot files, reporting document counts.
    Load {
        /// Clinical records (.csv or .json array)
        #[arg(long)]
        clinical: PathBuf,
        /// Genomic records (.csv or .json array)
        #[arg(long)]
        genomic: PathBuf,
        /// Trial declarations: a directory of .yml/.yaml/.json files
        #[arg(long)]
        trials: PathBuf,
    },
    /// Load a snapshot and run the matching pipeline end to end.
    Match {
        #[arg(long)]
        clinical: PathBuf,
        #[arg(long)]
        genomic: PathBuf,
        #[arg(long)]
        trials: PathBuf,
        /// Tumor taxonomy file; overrides the configured path
        #[arg(long)]
        tumor_tree: Option<PathBuf>,
        /// Write the matches here after the run
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },
}

async fn load_snapshot(
    store: &dyn Store,
    clinical: &PathBuf,
    genomic: &PathBuf,
    trials: &PathBuf,
) -> anyhow::Result<(usize, usize, usize)> {
    let c = loader::load_clinical(store, clinical)
        .await
        .with_context(|| format!("loading {}", clinical.display()))?;
    let g = loader::load_genomic(store, genomic)
        .await
        .with_context(|| format!("loading {}", genomic.display()))?;
    let t = loader::load_trials(store, trials)
        .await
        .with_context(|| format!("loading {}", trials.display()))?;
    Ok((c, g, t))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oncomatch=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MatchConfig::load().context("loading configuration")?;
    if !config.store_uri.starts_with("memory://") {
        tracing::warn!(uri = %config.store_uri, "only the embedded store adapter is wired in");
    }

    match cli.command {
        Command::Load {
            clinical,
            genomic,
            trials,
        } => {
            let store = MemoryStore::new();
            let (c, g, t) = load_snapshot(&store, &clinical, &genomic, &trials).await?;
            info!(clinical = c, genomic = g, trials = t, "snapshot loads cleanly");
        }
        Command::Match {
            clinical,
            genomic,
            trials,
            tumor_tree,
            out,
            format,
        } => {
            let store = Arc::new(MemoryStore::new());
            let (c, g, t) = load_snapshot(store.as_ref(), &clinical, &genomic, &trials).await?;
            info!(clinical = c, genomic = g, trials = t, "snapshot loaded");

            let tree_path = tumor_tree
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.tumor_tree_path.clone());
            let oncotree = Oncotree::from_path(&tree_path)
                .with_context(|| format!("loading tumor tree {tree_path}"))?;
            if oncotree.is_empty() {
                tracing::warn!(path = %tree_path, "tumor tree is empty, diagnoses will not expand");
            }

            let engine = MatchEngine::new(store, config, oncotree).await?;
            let matches = engine.find_trial_matches().await?;
            info!(matches = matches.len(), "run complete");

            if let Some(out) = out {
                match format {
                    ExportFormat::Csv => export::write_csv(&matches, &out)?,
                    ExportFormat::Json => export::write_json(&matches, &out)?,
                }
                info!(out = %out.display(), "matches exported");
            }
        }
    }

    Ok(())
}
