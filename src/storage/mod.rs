//!
//! ferry storage backends
//! ----------------------
//! Capability-polymorphic storage over named blobs. Two implementations
//! satisfy the [`StorageBackend`] contract: a local-filesystem store and an
//! S3 object store. The backend is chosen once at startup and injected into
//! every session as `Arc<dyn StorageBackend>`; sessions never branch on the
//! storage mode themselves.
//!
//! Contract highlights:
//! - `list` returns blobs in backend-native enumeration order.
//! - `open_for_read` yields the blob size and a lazy byte stream of exactly
//!   that many bytes.
//! - `open_for_write` yields a sink whose `commit` makes the blob atomically
//!   visible at exactly the written size; an aborted or dropped sink leaves
//!   nothing visible.
//!
//! Callers pass names already reduced to a single path segment (see
//! `protocol::sanitize_name`); backends treat the name as an opaque key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::Result;

mod local;
mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

/// Metadata for one stored blob, as reported by `list`.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// An open download: announced size plus a forward-only byte stream.
/// Reading past `size` bytes is undefined and must not be attempted.
pub struct BlobReader {
    pub size: u64,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// An in-flight upload. Bytes become visible only on `commit`; `abort`
/// discards everything written so far. Dropping an uncommitted sink must
/// behave like `abort` (best effort).
#[async_trait]
pub trait BlobSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn abort(self: Box<Self>);
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Enumerate all blobs. Fails with `BackendUnavailable` when the
    /// underlying store cannot be reached; the caller reports this to the
    /// peer and must not retry.
    async fn list(&self) -> Result<Vec<BlobInfo>>;

    /// Open a blob for download. Fails with `NotFound` when absent.
    async fn open_for_read(&self, name: &str) -> Result<BlobReader>;

    /// Open a blob for upload of `expected_size` bytes.
    async fn open_for_write(&self, name: &str, expected_size: u64) -> Result<Box<dyn BlobSink>>;
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod local_tests;
