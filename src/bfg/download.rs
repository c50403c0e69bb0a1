use std::{io::Write, path::Path, time::Duration};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the jar comes from and how to check it
#[derive(Debug, Clone, Copy)]
pub struct JarSource<'a> {
    pub url: &'a str,
    /// Expected SHA-256 (hex) of a fresh download
    pub sha256: Option<&'a str>,
    /// Limit on the whole transfer; `None` waits as long as the body keeps coming
    pub timeout: Option<Duration>,
}

/// Download the BFG jar to `jar_path` unless it is already there.
///
/// An existing jar is trusted as-is. Returns whether a download happened.
pub fn ensure_jar(jar_path: &Path, source: &JarSource<'_>) -> Result<bool> {
    if jar_path.exists() {
        tracing::debug!("using cached BFG at {:?}", jar_path);
        return Ok(false);
    }

    println!("Downloading BFG...");
    let body = fetch(source.url, source.timeout)?;

    if let Some(expected) = source.sha256 {
        verify_sha256(&body, expected)?;
    }

    persist(jar_path, &body)?;
    tracing::info!(
        "downloaded {} bytes from {} to {:?}",
        body.len(),
        source.url,
        jar_path
    );
    Ok(true)
}

fn fetch(url: &str, timeout: Option<Duration>) -> Result<Vec<u8>> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to download BFG from {}", url))?
        .error_for_status()
        .with_context(|| format!("BFG download from {} was rejected", url))?;

    let body = response
        .bytes()
        .with_context(|| format!("Failed to read BFG download from {}", url))?;
    Ok(body.to_vec())
}

fn verify_sha256(content: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(content));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(Error::Checksum {
            expected: expected.trim().to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}

/// Write into a temp file next to `path`, then rename over it
fn persist(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("BFG path has no parent directory: {:?}", path))?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
    temp_file
        .write_all(content)
        .context("Failed to write BFG jar")?;
    temp_file.flush().context("Failed to flush BFG jar")?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to move BFG jar into place at {:?}", path))?;
    Ok(())
}
