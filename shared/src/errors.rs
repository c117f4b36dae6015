/// Unified error types for the Onetime system.
use thiserror::Error;

/// Errors surfaced by the metadata fetcher and the stream downloader.
///
/// Every variant is terminal for the request that produced it; nothing in the
/// core retries.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(#[from] serde_json::Error),

    #[error("Invalid format identifier: {0:?}")]
    InvalidFormat(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("yt-dlp timed out after {0}s")]
    Timeout(u64),

    #[error("Download cancelled")]
    Cancelled,
}

impl MediaError {
    /// Whether the caller supplied bad input (as opposed to a tool failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, MediaError::InvalidUrl(_) | MediaError::InvalidFormat(_))
    }
}

/// Errors from the metadata cache store. Never escapes the fetcher.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for fetch and download operations.
pub type MediaResult<T> = Result<T, MediaError>;
