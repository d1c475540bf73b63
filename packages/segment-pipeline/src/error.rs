//! Typed errors for the segmentation pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match on
//! the failure instead of classifying error strings.

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::state::RunState;

/// Errors surfaced by pipeline stages and the reindexer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source text was empty or unusable; nothing was persisted.
    #[error("segmentation produced no segments for document {doc_id}")]
    SegmentationEmpty { doc_id: String },

    /// A persistence call failed. Writes that already succeeded stay written.
    #[error("store write failed during {operation}: {source}")]
    StoreWrite {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Loading existing state failed.
    #[error("store read failed: {0}")]
    StoreRead(#[source] StoreError),

    /// Reorder request does not match the current position set. No writes were issued.
    #[error("reorder rejected: {0}")]
    ReorderPreconditionViolated(#[from] ReorderViolation),

    /// Another stage is already running for this document.
    #[error("document {doc_id} already has a run in progress ({state})")]
    RunInProgress { doc_id: String, state: RunState },

    /// Segment does not exist.
    #[error("segment not found: {doc_id} position {position}")]
    SegmentNotFound { doc_id: String, position: i64 },

    /// Segment references text that the text store no longer holds.
    #[error("text for {doc_id} position {position} is unavailable")]
    TextUnavailable { doc_id: String, position: i64 },

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Wrap a store error raised by a write.
    pub fn write(operation: &'static str, source: StoreError) -> Self {
        Self::StoreWrite { operation, source }
    }
}

/// Errors raised by record and text store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No segment at the given position
    #[error("no segment at {doc_id} position {position}")]
    NotFound { doc_id: String, position: i64 },

    /// Unique position constraint would be violated
    #[error("position {position} already taken in {doc_id}")]
    PositionTaken { doc_id: String, position: i64 },

    /// Backend-specific failure (connection, serialization, injected fault)
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Build a backend error from a plain message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into().into())
    }
}

/// Outcome of a failed call to the generative-text collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// The service is throttling. Retryable.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other failure. Never retried.
    #[error("generation failed: {0}")]
    Other(String),
}

/// Why a reorder request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderViolation {
    /// The request lists a different number of positions than exist.
    #[error("expected {expected} positions, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The request names a position no item currently holds.
    #[error("position {0} does not exist")]
    UnknownPosition(i64),

    /// The request lists the same position twice.
    #[error("position {0} listed more than once")]
    DuplicatePosition(i64),

    /// Current positions are not exactly 1..=N (for example after an interrupted reorder).
    #[error("current positions are not contiguous from 1")]
    NonContiguous,
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Segmentation bounds are inconsistent
    #[error("invalid segmentation bounds: {0}")]
    InvalidBounds(String),

    /// Environment variable present but unparsable
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    /// Required environment variable is not set
    #[error("{0} not set")]
    MissingEnv(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
