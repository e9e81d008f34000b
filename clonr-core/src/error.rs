use clonr_scanner::ScanError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable state could not be written. The run must stop: continuing
    /// would let the on-disk visited/done sets fall behind real progress.
    #[error("Failed to persist {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Setup error: {0}")]
    Setup(String),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
