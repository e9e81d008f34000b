use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Render of {url} timed out after {timeout:?}")]
    RenderTimeout { url: String, timeout: Duration },

    #[error("Render failed: {0}")]
    RenderError(String),

    #[error("Asset fetch failed: {0}")]
    FetchError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Whether another attempt at the same operation could succeed.
    /// A malformed URL never becomes valid on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ScanError::InvalidUrl(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
