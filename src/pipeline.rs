//! The cleanup run, one stage after another.

use std::fmt;

use anyhow::{Context, Result};

use crate::{
    bfg::{self, Bfg, JarSource},
    config::RunConfig,
    git::{self, MirrorAction},
};

/// Stages in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnsureEnvironment,
    LocateBlobs,
    RemoveBlobs,
    ReportSizeBefore,
    Compact,
    ReportSizeAfter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::EnsureEnvironment => "ensure environment",
            Stage::LocateBlobs => "locate blobs",
            Stage::RemoveBlobs => "remove blobs",
            Stage::ReportSizeBefore => "report size before",
            Stage::Compact => "compact",
            Stage::ReportSizeAfter => "report size after",
        };
        f.write_str(name)
    }
}

/// What a successful run did
#[derive(Debug)]
pub struct RunReport {
    pub mirror: MirrorAction,
    pub downloaded_bfg: bool,
    pub blobs_removed: usize,
    pub size_before: Option<String>,
    pub size_after: Option<String>,
}

fn enter(stage: Stage) {
    tracing::info!(%stage, "entering stage");
}

fn display_size(size: &Option<String>) -> &str {
    size.as_deref().unwrap_or("unknown")
}

/// Run the whole cleanup against `config`; any error aborts the remaining stages
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let workspace = &config.workspace;
    let repo_path = workspace.repo_path();

    enter(Stage::EnsureEnvironment);
    tracing::debug!("working directory {:?}", workspace.root());
    workspace.ensure_root()?;
    let downloaded_bfg = bfg::ensure_jar(
        &workspace.bfg_path(),
        &JarSource {
            url: &config.tool.bfg_url,
            sha256: config.tool.bfg_sha256.as_deref(),
            timeout: config.tool.download_timeout(),
        },
    )
    .with_context(|| format!("Stage '{}' failed", Stage::EnsureEnvironment))?;
    let mirror = git::ensure_mirror(&config.repo_url, &repo_path)?;

    enter(Stage::LocateBlobs);
    println!("Getting blobs related to {}", config.cache_paths.join(", "));
    let blobs = git::locate_blobs(&repo_path, &config.cache_paths)
        .with_context(|| format!("Stage '{}' failed", Stage::LocateBlobs))?;
    for blob in &blobs {
        tracing::debug!("{} {} {}", blob.id, blob.kind, blob.path);
    }
    println!("Found {} blobs to delete.", blobs.len());

    enter(Stage::RemoveBlobs);
    println!("Removing blobs, do not interrupt this process.");
    let worklist = workspace.blob_ids_path();
    bfg::write_worklist(&worklist, &blobs)?;
    let runner = Bfg::new(config.tool.java_path.clone(), workspace.bfg_path());
    let output = runner.strip_blobs(&repo_path, &worklist)?;
    for line in bfg::summary(&output.stdout, config.tool.summary_lines) {
        println!("{}", line);
    }
    println!("Done removing blobs.");

    enter(Stage::ReportSizeBefore);
    let size_before = git::pack_size(&repo_path);

    let size_after = if config.compact {
        println!("Repository size before: {}", display_size(&size_before));

        enter(Stage::Compact);
        println!("Pruning repo... please wait, this may take a while");
        git::compact(&repo_path)
            .with_context(|| format!("Stage '{}' failed", Stage::Compact))?;

        enter(Stage::ReportSizeAfter);
        let size_after = git::pack_size(&repo_path);
        println!("Repository size after: {}", display_size(&size_after));
        size_after
    } else {
        println!(
            "Repository size: {} (compaction skipped)",
            display_size(&size_before)
        );
        size_before.clone()
    };

    println!();
    println!(
        "Go to {} and inspect the changes then push it, if desired. \
         Remember that it's a mirror, so the files will not be visible. \
         Git commands should work though.",
        repo_path.display()
    );

    Ok(RunReport {
        mirror,
        downloaded_bfg,
        blobs_removed: blobs.len(),
        size_before,
        size_after,
    })
}
