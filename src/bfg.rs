//! BFG Repo-Cleaner: fetching the jar and running it against the mirror.

mod download;
mod runner;

pub use download::{ensure_jar, JarSource};
pub use runner::{summary, write_worklist, Bfg};
