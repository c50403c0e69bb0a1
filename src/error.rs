use std::{fmt, path::PathBuf, process::ExitStatus};

/// Failures that abort a run and need a specific message for the operator.
#[derive(Debug)]
pub enum Error {
    /// `git remote update` failed inside an existing mirror
    MirrorUpdate { repo: PathBuf, detail: String },
    /// BFG exited non-zero; its output has already been printed
    RewriteFailed(ExitStatus),
    /// A freshly downloaded jar did not match the configured digest
    Checksum { expected: String, actual: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MirrorUpdate { repo, detail } => write!(
                f,
                "Cannot update repo in {}. Try clearing the directory. ({})",
                repo.display(),
                detail
            ),
            Error::RewriteFailed(status) => write!(f, "BFG failed ({})", status),
            Error::Checksum { expected, actual } => write!(
                f,
                "Downloaded BFG checksum mismatch: expected {}, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for Error {}
