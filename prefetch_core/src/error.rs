use thiserror::Error;

use crate::types::ContentKey;

/// Errors raised by a content service adapter.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("unknown content key: {0}")]
    UnknownKey(String),

    #[error("{url} responded with HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("operation released before completion")]
    Released,

    #[error("{0}")]
    Other(String),
}

/// Failure modes of a loader run.
///
/// `Cancelled`, `InitializationFailed` and `Service` abort a run;
/// `KeyDownloadFailed` is recorded per item and the batch continues.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("download cancelled")]
    Cancelled,

    #[error("content service returned no catalog")]
    InitializationFailed,

    #[error("download of {key} failed: {reason}")]
    KeyDownloadFailed { key: ContentKey, reason: String },

    /// Any service failure other than a per-key download failure.
    #[error("content service error: {0}")]
    Service(#[from] ServiceError),
}

impl LoaderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled)
    }
}
