//! Wrappers around the `git` commands the pipeline shells out to.

mod maintenance;
mod mirror;
mod objects;

pub use maintenance::{compact, pack_size};
pub use mirror::{ensure_mirror, MirrorAction};
pub use objects::{locate_blobs, BlobRecord};
