use std::path::PathBuf;

use thiserror::Error;

/// Failures the caller is expected to tell apart.
///
/// Provider failures are not represented here: they degrade to a fallback
/// value inside the retrieval pipeline, or surface as `anyhow` errors from the
/// final generation call.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("vector store not loaded: call load() first")]
    StoreNotLoaded,

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("no supported files found in the provided paths")]
    NoSupportedFiles,

    #[error("{field} too large for binary store: {len} exceeds {max}")]
    RecordTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}
