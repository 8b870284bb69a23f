//! Typed error taxonomy (§7). The distilled spec's substring-matching
//! approach to distinguishing "invalid format" from "incomplete file" is
//! called out as an implementation weakness in §9; this crate implements
//! the redesign with closed enums instead.

use std::path::PathBuf;

use thiserror::Error;

/// Raised when an [`crate::config::EngineConfig`] fails to produce a usable
/// engine at startup: storage directory missing/unwritable, or a
/// configured kind entry is malformed.
#[derive(Debug, Error)]
pub enum EngineInitError {
    #[error("failed to open or create storage directory {path}: {source}")]
    StorageDirectory { path: PathBuf, source: std::io::Error },

    #[error("failed to enumerate storage files in {path}: {source}")]
    Enumeration { path: PathBuf, source: std::io::Error },
}

/// Caller-visible validation failure for a [`crate::config::QueryRequest`]
/// (§6.4). These abort the whole request; they are never absorbed.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("start/end timestamps must be non-negative, got start={start} end={end}")]
    NegativeTimestamp { start: i64, end: i64 },

    #[error("startSec ({start}) must be <= endSec ({end})")]
    StartAfterEnd { start: i64, end: i64 },

    #[error("invalid namespace {0:?}: must be <=63 lowercase alphanumeric-or-hyphen characters, not leading/trailing hyphen")]
    InvalidNamespace(String),
}

/// The two error kinds a query can surface to its caller (§6.4, §7).
/// Per-file partial failures never become a `QueryError`; they are
/// absorbed and counted only in debug/warn logs.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Writer-side errors. A flush failure aborts that flush; the events it was
/// carrying are lost, per the accepted no-WAL durability trade-off (§4.3,
/// §7).
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error writing block: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize events for block: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress block payload: {0}")]
    Compress(String),
}
