//! Blob discovery: `git rev-list --objects` piped into `git cat-file --batch-check`.

use std::{
    io::{BufRead, BufReader},
    path::Path,
    process::{Command, Stdio},
    thread,
};

use anyhow::{Context, Result};
use gix_object::Kind;

use crate::process::{drain, join_reader, Echo};

const BATCH_CHECK_FORMAT: &str = "--batch-check=%(objectname) %(objecttype) %(rest)";

/// A blob reachable under one of the path filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub id: String,
    pub kind: Kind,
    pub path: String,
}

/// Find every blob ever reachable under `paths` in the repository at `repo_path`.
///
/// Records come back in `rev-list` order; duplicates are kept.
pub fn locate_blobs(repo_path: &Path, paths: &[String]) -> Result<Vec<BlobRecord>> {
    let mut rev_list = Command::new("git")
        .current_dir(repo_path)
        .arg("rev-list")
        .arg("--all")
        .arg("--objects")
        .arg("--")
        .args(paths)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn git rev-list")?;

    let objects = rev_list
        .stdout
        .take()
        .context("git rev-list stdout was not piped")?;

    let mut cat_file = match Command::new("git")
        .current_dir(repo_path)
        .arg("cat-file")
        .arg(BATCH_CHECK_FORMAT)
        .stdin(Stdio::from(objects))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = rev_list.kill();
            let _ = rev_list.wait();
            return Err(e).context("Failed to spawn git cat-file");
        }
    };

    let rev_list_err = rev_list
        .stderr
        .take()
        .context("git rev-list stderr was not piped")?;
    let cat_file_err = cat_file
        .stderr
        .take()
        .context("git cat-file stderr was not piped")?;
    let records = cat_file
        .stdout
        .take()
        .context("git cat-file stdout was not piped")?;

    let (blobs, rev_list_err, cat_file_err) = thread::scope(|s| {
        let rev_list_err = s.spawn(|| drain(rev_list_err, Echo::Quiet));
        let cat_file_err = s.spawn(|| drain(cat_file_err, Echo::Quiet));
        let blobs = read_blobs(BufReader::new(records));
        (blobs, join_reader(rev_list_err), join_reader(cat_file_err))
    });

    let rev_list_status = rev_list.wait().context("Failed to wait for git rev-list")?;
    let cat_file_status = cat_file.wait().context("Failed to wait for git cat-file")?;

    if !rev_list_status.success() {
        anyhow::bail!(
            "git rev-list failed ({}): {}",
            rev_list_status,
            rev_list_err?.trim()
        );
    }
    if !cat_file_status.success() {
        anyhow::bail!(
            "git cat-file failed ({}): {}",
            cat_file_status,
            cat_file_err?.trim()
        );
    }

    let blobs = blobs?;
    tracing::debug!("located {} blobs under {:?}", blobs.len(), paths);
    Ok(blobs)
}

/// Parse batch-check output as it streams in
fn read_blobs<R: BufRead>(mut reader: R) -> Result<Vec<BlobRecord>> {
    let mut blobs = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .context("Failed to read git cat-file output")?;
        if read == 0 {
            break;
        }
        if let Some(blob) = parse_batch_check_line(&String::from_utf8_lossy(&line)) {
            blobs.push(blob);
        }
    }

    Ok(blobs)
}

/// Parse one `<id> <type> <rest>` line, keeping only blobs.
///
/// Blank lines, `missing` entries, unknown types and ids that are not hex
/// yield `None`.
fn parse_batch_check_line(line: &str) -> Option<BlobRecord> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return None;
    }

    let mut fields = line.splitn(3, ' ');
    let id = fields.next()?;
    let kind = Kind::from_bytes(fields.next()?.as_bytes()).ok()?;
    let path = fields.next().unwrap_or_default();

    if kind != Kind::Blob || !is_object_id(id) {
        return None;
    }

    Some(BlobRecord {
        id: id.to_string(),
        kind,
        path: path.to_string(),
    })
}

/// SHA-1 (40) or SHA-256 (64) hex object name
fn is_object_id(id: &str) -> bool {
    matches!(id.len(), 40 | 64) && hex::decode(id).is_ok()
}
