//! Error types for the resource cache
//!
//! Provides unified error handling using thiserror, plus the out-of-band
//! error reporter used for failures that never reach a caller.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::warn;

use crate::models::ErrorResponse;

// == Fetch Error ==
/// Failure of the underlying network fetch.
///
/// Cloneable so a single failure can be handed to every caller waiting on
/// the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Locator could not be turned into a request
    #[error("invalid locator {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Transport-level failure (connect, timeout, body read)
    #[error("request to {locator} failed: {reason}")]
    Transport { locator: String, reason: String },

    /// Remote answered with a non-success status
    #[error("request to {locator} returned status {status}")]
    Status { locator: String, status: u16 },

    /// The fetch task ended without producing a result
    #[error("fetch for {0} was abandoned")]
    Abandoned(String),
}

// == Cache Error Enum ==
/// Unified error type for the resource cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Descriptor violates its own constraints
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Key not present in the store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Entry outlived the configured max age
    #[error("Key expired: {0}")]
    Expired(String),

    /// Filesystem failure
    #[error("Storage error during {op} on {}: {source}", .path.display())]
    Storage {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Single payload larger than the whole store
    #[error("Payload of {size} bytes exceeds cache capacity of {capacity} bytes")]
    PayloadTooLarge { size: u64, capacity: u64 },

    /// Stored record failed validation; self-healed by the store
    #[error("Corrupt entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// Network fallback failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Builds a storage error for `op` on `path`.
    pub fn storage(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Storage {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for the lookup outcomes a caller treats as a plain miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::Expired(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidDescriptor(_) => StatusCode::BAD_REQUEST,
            CacheError::NotFound(_) | CacheError::Expired(_) => StatusCode::NOT_FOUND,
            CacheError::PayloadTooLarge { .. } => StatusCode::INSUFFICIENT_STORAGE,
            CacheError::Fetch(_) => StatusCode::BAD_GATEWAY,
            CacheError::Storage { .. }
            | CacheError::CorruptEntry { .. }
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Error Reporter ==
/// Callback receiving errors that are handled internally rather than
/// returned: failed write-backs, corrupt entries, failed evictions.
#[derive(Clone)]
pub struct ErrorReporter {
    report: Arc<dyn Fn(&CacheError) + Send + Sync>,
}

impl ErrorReporter {
    /// Wraps a custom callback.
    pub fn new(report: impl Fn(&CacheError) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// Hands `error` to the callback.
    pub fn report(&self, error: &CacheError) {
        (self.report)(error)
    }
}

impl Default for ErrorReporter {
    /// Logs every reported error at warn level.
    fn default() -> Self {
        Self::new(|error| warn!(%error, "Cache error"))
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter").finish_non_exhaustive()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the resource cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_is_miss() {
        assert!(CacheError::NotFound("k".into()).is_miss());
        assert!(CacheError::Expired("k".into()).is_miss());
        assert!(!CacheError::InvalidDescriptor("bad".into()).is_miss());
        assert!(!CacheError::Fetch(FetchError::Abandoned("k".into())).is_miss());
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let err = CacheError::storage(
            "write",
            "/tmp/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("denied"));
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_reporter_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ErrorReporter::new(move |e| sink.lock().unwrap().push(e.to_string()));

        reporter.report(&CacheError::Internal("boom".into()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("boom"));
    }

    #[test]
    fn test_error_status_codes() {
        let resp = CacheError::InvalidDescriptor("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = CacheError::Fetch(FetchError::Status {
            locator: "http://a".into(),
            status: 500,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
