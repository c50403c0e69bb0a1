use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::workspace::Workspace;

/// Path filter used when none is given on the command line
pub const DEFAULT_CACHE_PATH: &str = ".yarn/cache";

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Settings that rarely change between runs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoverConfig {
    /// Where to fetch the BFG jar from when it is missing
    #[serde(default = "defaults::bfg_url")]
    pub bfg_url: String,
    /// Expected SHA-256 of a freshly downloaded jar (hex)
    #[serde(default)]
    pub bfg_sha256: Option<String>,
    /// Java runtime used to launch BFG
    #[serde(default = "defaults::java_path")]
    pub java_path: PathBuf,
    /// Limit in seconds on the whole jar download; unset means no limit
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    /// Number of trailing BFG output lines shown on success
    #[serde(default = "defaults::summary_lines")]
    pub summary_lines: usize,
    /// Run reflog expiry and aggressive gc after rewriting
    #[serde(default = "defaults::compact")]
    pub compact: bool,
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            bfg_url: defaults::bfg_url(),
            bfg_sha256: None,
            download_timeout_secs: None,
            java_path: defaults::java_path(),
            summary_lines: defaults::summary_lines(),
            compact: defaults::compact(),
        }
    }
}

impl RemoverConfig {
    /// Load configuration from the config file (if any) and environment variables
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => Some(expand_tilde(path)),
            None => match env::var_os("GIT_CACHE_REMOVER_CONFIG") {
                Some(path) => Some(expand_tilde(Path::new(&path))),
                None => Self::config_file_path(),
            },
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                tracing::debug!("loading git-cache-remover config from {:?}", path);
                Self::load_from_file(&path)?
            }
            Some(path) => {
                tracing::debug!("no config file at {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: RemoverConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.java_path = expand_tilde(&config.java_path);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GIT_CACHE_REMOVER_BFG_URL") {
            self.bfg_url = url;
        }

        if let Some(digest) = lookup("GIT_CACHE_REMOVER_BFG_SHA256") {
            self.bfg_sha256 = Some(digest);
        }

        if let Some(secs) = lookup("GIT_CACHE_REMOVER_DOWNLOAD_TIMEOUT") {
            self.download_timeout_secs = Some(
                secs.parse()
                    .context("Failed to parse GIT_CACHE_REMOVER_DOWNLOAD_TIMEOUT as u64")?,
            );
        }

        if let Some(path) = lookup("GIT_CACHE_REMOVER_JAVA") {
            self.java_path = expand_tilde(&PathBuf::from(path));
        }

        if let Some(lines) = lookup("GIT_CACHE_REMOVER_SUMMARY_LINES") {
            self.summary_lines = lines
                .parse()
                .context("Failed to parse GIT_CACHE_REMOVER_SUMMARY_LINES as usize")?;
        }

        Ok(())
    }

    /// Whole-transfer limit for the jar download
    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }

    /// Get default config file path
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/git-cache-remover/config.yaml"))
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(crate) fn bfg_url() -> String {
        "https://repo1.maven.org/maven2/com/madgag/bfg/1.14.0/bfg-1.14.0.jar".to_string()
    }

    pub(crate) fn java_path() -> PathBuf {
        PathBuf::from("java")
    }

    pub(crate) fn summary_lines() -> usize {
        3
    }

    pub(crate) fn compact() -> bool {
        true
    }
}

/// Everything one run needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub repo_url: String,
    pub workspace: Workspace,
    pub cache_paths: Vec<String>,
    pub compact: bool,
    pub tool: RemoverConfig,
}

impl RunConfig {
    pub fn resolve(
        repo_url: String,
        out_dir: &Path,
        cache_paths: Vec<String>,
        no_compact: bool,
        tool: RemoverConfig,
    ) -> Result<Self> {
        let workspace = Workspace::new(out_dir)?;

        let cache_paths = if cache_paths.is_empty() {
            vec![DEFAULT_CACHE_PATH.to_string()]
        } else {
            cache_paths
        };

        Ok(Self {
            repo_url,
            workspace,
            cache_paths,
            compact: tool.compact && !no_compact,
            tool,
        })
    }
}
