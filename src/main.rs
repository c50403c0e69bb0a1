#![deny(clippy::mod_module_files)]
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod bfg;
mod config;
mod error;
mod git;
mod pipeline;
mod process;
mod workspace;

use config::{RemoverConfig, RunConfig};

/// Strip cached package archives from a repository's history with BFG
#[derive(Parser, Debug)]
#[command(name = "git-cache-remover", version)]
struct Cli {
    /// Repository URL or path to mirror
    repo_url: String,

    /// Directory to store the pruned git repository in
    #[arg(long = "out-dir", alias = "outDir", value_name = "DIR")]
    out_dir: PathBuf,

    /// Cache path to remove; may be repeated (default: .yarn/cache)
    #[arg(long = "cache-path", alias = "cachePath", value_name = "PATH")]
    cache_path: Vec<String>,

    /// Skip reflog expiry and git gc after rewriting
    #[arg(long)]
    no_compact: bool,

    /// Config file (default: ~/.config/git-cache-remover/config.yaml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let tool = RemoverConfig::load(cli.config.as_deref())?;
    let config = RunConfig::resolve(
        cli.repo_url,
        &cli.out_dir,
        cli.cache_path,
        cli.no_compact,
        tool,
    )?;
    tracing::debug!("resolved run config: {:?}", config);

    let report = pipeline::run(&config)?;
    tracing::info!(
        mirror = ?report.mirror,
        downloaded_bfg = report.downloaded_bfg,
        blobs_removed = report.blobs_removed,
        size_before = ?report.size_before,
        size_after = ?report.size_after,
        "run complete"
    );

    Ok(())
}
