use std::path::PathBuf;
use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their transport errors into `External` so the core can
/// log and drop failures uniformly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("media acquisition failed: {0}")]
    Acquisition(String),

    #[error("media acquisition timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
