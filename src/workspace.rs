use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

const BFG_JAR: &str = "bfg.jar";
const REPO_DIR: &str = "repo-mirror";
const BLOB_IDS: &str = "blobids.txt";

/// Working directory layout for one run
///
/// ```text
/// <out-dir>/
///   bfg.jar        cached rewrite tool
///   repo-mirror/   mirror clone being cleaned
///   blobids.txt    worklist handed to BFG
/// ```
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Resolve `out_dir` to an absolute path; nothing is created yet
    pub fn new(out_dir: &Path) -> Result<Self> {
        let root = std::path::absolute(out_dir)
            .with_context(|| format!("Failed to resolve working directory: {:?}", out_dir))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bfg_path(&self) -> PathBuf {
        self.root.join(BFG_JAR)
    }

    pub fn repo_path(&self) -> PathBuf {
        self.root.join(REPO_DIR)
    }

    pub fn blob_ids_path(&self) -> PathBuf {
        self.root.join(BLOB_IDS)
    }

    /// Create the working directory, including missing parents
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create working directory: {:?}", self.root))
    }
}
