//! Error types for the ingestion pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a pipeline stage.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote source asked us to wait before retrying.
    ///
    /// Absorbed by [`crate::source::SourceClient`]; only escapes a source
    /// implementation, never a stage.
    #[error("rate limited by source, retry after {wait:?}")]
    RateLimited { wait: Duration },

    /// Rate limiting persisted past the configured number of waits.
    #[error("channel {channel}: still rate limited after {waits} waits")]
    RateLimitExhausted { channel: String, waits: u32 },

    /// HTTP transport error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The source rejected our credentials.
    #[error("authentication rejected by source (HTTP {status})")]
    Auth { status: u16 },

    /// The source answered with an unexpected status or body.
    #[error("source error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// A channel reference that cannot name a partition.
    #[error("invalid channel reference: {0:?}")]
    InvalidChannel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An append log line that could not be loaded.
    #[error("malformed record at {}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Relational store error.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// The detection capability failed for an image.
    #[error("detection failed for {}: {reason}", path.display())]
    Detection { path: PathBuf, reason: String },

    /// The external transform step failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
