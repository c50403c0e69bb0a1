use std::{path::Path, process::Command};

use anyhow::{Context, Result};

use crate::{
    error::Error,
    process::{run_captured, Echo},
};

/// What `ensure_mirror` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    Cloned,
    Updated,
}

/// Make sure `repo_path` holds an up-to-date mirror of `url`
pub fn ensure_mirror(url: &str, repo_path: &Path) -> Result<MirrorAction> {
    if repo_path.exists() {
        println!("Updating mirror in {}", repo_path.display());
        update_mirror(repo_path)?;
        Ok(MirrorAction::Updated)
    } else {
        println!("Cloning {} into {}", url, repo_path.display());
        clone_mirror(url, repo_path)?;
        Ok(MirrorAction::Cloned)
    }
}

/// `git clone --mirror <url> <dest>` with clone progress shown on the terminal.
///
/// Runs from the directory holding `dest`, so a relative local `url` is
/// resolved against the working directory rather than the caller's cwd.
fn clone_mirror(url: &str, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("Mirror path has no parent directory: {:?}", dest))?;

    let status = Command::new("git")
        .current_dir(parent)
        .arg("clone")
        .arg("--mirror")
        .arg(url)
        .arg(dest)
        .status()
        .context("Failed to spawn git clone --mirror")?;

    if !status.success() {
        anyhow::bail!("git clone --mirror {} failed ({})", url, status);
    }

    tracing::info!("cloned mirror of {} into {:?}", url, dest);
    Ok(())
}

/// `git remote update` inside an existing mirror
///
/// The mirror is never deleted or re-cloned here; a failure is left for the
/// operator to resolve.
fn update_mirror(repo_path: &Path) -> Result<()> {
    let output = run_captured(
        Command::new("git").arg("remote").arg("update").current_dir(repo_path),
        Echo::Stderr,
    )?;

    let reported = reported_error(&output.stderr);
    if !output.status.success() || reported.is_some() {
        let detail = reported
            .unwrap_or_else(|| format!("git remote update exited with {}", output.status));
        return Err(Error::MirrorUpdate {
            repo: repo_path.to_path_buf(),
            detail,
        }
        .into());
    }

    tracing::info!("updated mirror in {:?}", repo_path);
    Ok(())
}

/// First `error:`/`fatal:` diagnostic git wrote, if any.
///
/// git prints progress and "From ..." lines on stderr during a normal fetch,
/// so only diagnostics count as failure.
fn reported_error(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("error:") || line.starts_with("fatal:"))
        .map(str::to_string)
}
