//! Lazy, shared, asynchronously-opened handle onto a [`sled::Db`].
//!
//! `sled::open` is a blocking filesystem call; opening it eagerly in a
//! constructor would make every `tierdata-sled` type's construction
//! blocking too. Instead the handle exposes an async [`SledHandle::ready`]
//! gate — the same shape the teacher's durable backend gives its
//! synchronous embedded store a blocking-call boundary via
//! `tokio::task::spawn_blocking`, just pushed one level earlier (open, not
//! only read/write) because `sled::Db` itself is the thing that needs to
//! exist before any tree can be opened.

use std::path::PathBuf;
use std::sync::Arc;

use tierdata_core::{SourceError, SourceResult};
use tokio::sync::OnceCell;

/// Shared, lazily-opened handle onto a durable sled database.
///
/// Cheap to clone: clones share the same underlying `OnceCell` and, once
/// opened, the same `sled::Db`.
#[derive(Clone)]
pub struct SledHandle {
    path: PathBuf,
    db: Arc<OnceCell<SourceResult<sled::Db>>>,
}

impl SledHandle {
    /// Builds a handle for the database at `path`. The database is not
    /// opened until [`SledHandle::ready`] (or any operation that depends on
    /// it) is first awaited.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SledHandle {
            path: path.into(),
            db: Arc::new(OnceCell::new()),
        }
    }

    /// Resolves once the database is open, opening it on first call.
    ///
    /// Every subsequent call, including concurrent ones, observes the same
    /// outcome without re-opening the database.
    pub async fn ready(&self) -> SourceResult<()> {
        self.db().await.map(|_| ())
    }

    pub(crate) async fn db(&self) -> SourceResult<sled::Db> {
        let result = self
            .db
            .get_or_init(|| async {
                let path = self.path.clone();
                match tokio::task::spawn_blocking(move || sled::open(path)).await {
                    Ok(Ok(db)) => Ok(db),
                    Ok(Err(e)) => Err(SourceError::server_error_with_source("failed to open sled database", e)),
                    Err(e) => Err(SourceError::server_error_with_source("sled open task panicked", e)),
                }
            })
            .await;
        result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_opens_once_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SledHandle::new(dir.path().join("db"));
        handle.ready().await.unwrap();
        handle.ready().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_ready_calls_share_one_open() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SledHandle::new(dir.path().join("db"));
        let a = handle.clone();
        let b = handle.clone();
        let (ra, rb) = tokio::join!(a.ready(), b.ready());
        ra.unwrap();
        rb.unwrap();
    }
}
