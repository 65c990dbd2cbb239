// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the retrieval core.
//!
//! Library operations return [`RagError`]; the binary wraps them in
//! `anyhow` with command-level context before exiting non-zero.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed provider error carried by [`RagError::GatewayFailure`].
pub type GatewayError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by chunking, indexing, retrieval and answer synthesis.
#[derive(Debug, Error)]
pub enum RagError {
    /// A caller-supplied parameter is out of range (chunking config, `k`, empty vectors).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An ingestion record could not be decoded or is missing required fields.
    #[error("malformed input in {origin} at {location}: {reason}")]
    MalformedInput {
        origin: String,
        location: String,
        reason: String,
    },

    /// A vector's length differs from the index dimensionality.
    #[error("dimension mismatch during {operation}: expected {expected}, got {actual}")]
    DimensionMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The persistent index was built with a different embedding model.
    #[error("index was built with embedding model '{stored}', but '{configured}' is configured")]
    ModelMismatch { stored: String, configured: String },

    /// The embedding or generative provider failed.
    #[error("{operation} failed for {subject}")]
    GatewayFailure {
        operation: &'static str,
        subject: String,
        #[source]
        source: GatewayError,
    },

    /// Generation did not finish before the deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// SQLite-backed index failure.
    #[error("index storage error during {operation}")]
    Storage {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Filesystem failure while reading input or preparing the index directory.
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RagError {
    /// Wraps a provider error with the operation and subject it was serving.
    pub fn gateway(
        operation: &'static str,
        subject: impl Into<String>,
        source: impl Into<GatewayError>,
    ) -> Self {
        Self::GatewayFailure {
            operation,
            subject: subject.into(),
            source: source.into(),
        }
    }

    /// Returns a closure mapping `rusqlite` errors for the given operation.
    pub fn storage(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Storage { operation, source }
    }

    /// True when the error is the distinguishable generation timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Convenience alias used across the library core.
pub type Result<T> = std::result::Result<T, RagError>;
