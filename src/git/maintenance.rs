use std::{path::Path, process::Command, time::Duration};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::process::{run_captured, run_checked, Echo};

/// Human-readable packed size from `git count-objects -vH`.
///
/// Advisory only: any failure is logged and reported as `None`.
pub fn pack_size(repo_path: &Path) -> Option<String> {
    let output = match run_captured(
        Command::new("git")
            .arg("count-objects")
            .arg("-vH")
            .current_dir(repo_path),
        Echo::Quiet,
    ) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Failed to query repository size: {:#}", e);
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(
            "git count-objects exited with {}: {}",
            output.status,
            output.stderr.trim()
        );
        return None;
    }

    let size = parse_size_pack(&output.stdout);
    if size.is_none() {
        tracing::warn!("git count-objects output has no size-pack field");
    }
    size
}

fn parse_size_pack(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("size-pack: "))
        .map(|size| size.trim().to_string())
}

/// Drop all reflog entries and repack aggressively, pruning unreachable objects now
pub fn compact(repo_path: &Path) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg} ({elapsed})")
            .context("Failed to create spinner template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    spinner.set_message("Expiring reflog");
    run_checked(
        Command::new("git")
            .arg("reflog")
            .arg("expire")
            .arg("--expire=now")
            .arg("--all")
            .current_dir(repo_path),
    )?;

    spinner.set_message("Running git gc --aggressive");
    run_checked(
        Command::new("git")
            .arg("gc")
            .arg("--prune=now")
            .arg("--aggressive")
            .current_dir(repo_path),
    )?;

    spinner.finish_and_clear();
    tracing::info!("compacted {:?}", repo_path);
    Ok(())
}
