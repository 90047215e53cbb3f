//! Error taxonomy for source operations.
//!
//! Every fallible operation on a [`crate::Source`] resolves to one of three
//! kinds, matching the caller-observability and retry policy described by the
//! coordinator: a [`SourceError::BadRequest`] is the caller's fault and is
//! never retried, a [`SourceError::ServerError`] is the remote's fault and is
//! not automatically retried either, and [`SourceError::Unexpected`] marks a
//! programmer error that should surface immediately.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A cloneable handle onto a boxed source error.
///
/// `SourceError` must stay `Clone` (`IdBatcher::flush` fans one error out to
/// several waiters; `SledHandle::db` clones a cached `OnceCell` result), so
/// the wrapped error is kept behind an `Arc` rather than a `Box`. This type
/// implements [`std::error::Error`] itself — delegating `Display` and
/// `source()` to the error it wraps — so `thiserror`'s derive can pick it up
/// as a `#[source]` field the same way it would any other error type.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<dyn StdError + Send + Sync>);

impl SharedError {
    fn new(err: impl StdError + Send + Sync + 'static) -> Self {
        SharedError(Arc::new(err))
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for SharedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Error returned by any [`crate::Source`] operation.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Caller-observable precondition violated, or a remote 4xx response.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Remote 5xx response, unknown status code, or an internal invariant
    /// violation on the remote side (e.g. a create response with no id).
    ///
    /// The second field carries the underlying transport or decode error
    /// when one caused this, boxed so this crate stays transport-agnostic —
    /// a `tierdata-remote` caller attaches its `reqwest::Error` here rather
    /// than this crate naming that type directly.
    #[error("server error: {0}")]
    ServerError(String, #[source] Option<SharedError>),

    /// Programmer error: calling a by-id operation with a filtered/paginated
    /// `RequestDetails`, issuing `set_items` with a non-local request type,
    /// or using a filter that isn't remote-compatible.
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl SourceError {
    /// Builds a [`SourceError::ServerError`] with no wrapped source.
    pub fn server_error(message: impl Into<String>) -> Self {
        SourceError::ServerError(message.into(), None)
    }

    /// Builds a [`SourceError::ServerError`] wrapping the error that caused it.
    pub fn server_error_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        SourceError::ServerError(message.into(), Some(SharedError::new(source)))
    }

    /// Maps an HTTP status code onto the three-kind error taxonomy above.
    pub fn from_status(status: u16, body_snippet: impl Into<String>) -> Self {
        let body = body_snippet.into();
        match status {
            200..=299 => {
                unreachable!("from_status must only be called for non-2xx responses")
            }
            400..=499 => SourceError::BadRequest(format!("http {status}: {body}")),
            500..=599 => SourceError::server_error(format!("http {status}: {body}")),
            other => SourceError::server_error(format!("unexpected status {other}: {body}")),
        }
    }
}

/// Result alias used throughout the crate family.
pub type SourceResult<T> = Result<T, SourceError>;
