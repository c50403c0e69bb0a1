use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tempfile::NamedTempFile;

use crate::{
    error::Error,
    git::BlobRecord,
    process::{run_captured, CapturedOutput, Echo},
};

/// Write blob ids one per line, replacing whatever `path` held before
pub fn write_worklist(path: &Path, blobs: &[BlobRecord]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("Worklist path has no parent directory: {:?}", path))?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
    for blob in blobs {
        writeln!(temp_file, "{}", blob.id).context("Failed to write blob id")?;
    }
    temp_file.flush().context("Failed to flush worklist")?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write worklist to {:?}", path))?;
    Ok(())
}

/// Launches `java -jar bfg.jar` for a repository
pub struct Bfg {
    java: PathBuf,
    jar: PathBuf,
}

impl Bfg {
    pub fn new(java: PathBuf, jar: PathBuf) -> Self {
        Self { java, jar }
    }

    /// Strip every blob listed in `worklist` from all history of `repo_path`.
    ///
    /// On a non-zero exit both captured streams are printed in full and
    /// [`Error::RewriteFailed`] is returned.
    pub fn strip_blobs(&self, repo_path: &Path, worklist: &Path) -> Result<CapturedOutput> {
        let mut cmd = Command::new(&self.java);
        cmd.arg("-jar")
            .arg(&self.jar)
            .arg("--no-blob-protection")
            .arg("--strip-blobs-with-ids")
            .arg(worklist)
            .current_dir(repo_path);

        let spinner = ProgressBar::new_spinner();
        spinner.set_message("BFG is rewriting history");
        spinner.enable_steady_tick(Duration::from_millis(120));
        let output = run_captured(&mut cmd, Echo::Quiet);
        spinner.finish_and_clear();
        let output = output?;

        if !output.status.success() {
            println!("BFG failed:");
            println!("{}", output.stdout);
            println!("{}", output.stderr);
            return Err(Error::RewriteFailed(output.status).into());
        }

        Ok(output)
    }
}

/// Last `count` non-blank lines of `stdout`, indented for display
pub fn summary(stdout: &str, count: usize) -> Vec<String> {
    let lines: Vec<&str> = stdout.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..]
        .iter()
        .map(|line| format!("  {}", line))
        .collect()
}
