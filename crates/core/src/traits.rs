//! Storage capability traits
//!
//! Every backend adapter implements [`StorageClient`]. The transfer engine
//! only ever talks to these traits, so a new backend plugs in without any
//! engine changes.

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata returned by [`StorageClient::stat`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    /// Object size in bytes
    pub content_length: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectStat {
    pub fn new(content_length: u64) -> Self {
        Self {
            content_length,
            last_modified: None,
            etag: None,
            content_type: None,
        }
    }
}

/// Sequential read half of an open object
///
/// Resources are released when the reader is dropped.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectReader: Send {
    /// Read up to `max_bytes`. An empty buffer means end of stream.
    async fn read(&mut self, max_bytes: usize) -> Result<Bytes>;
}

/// Sequential write half of an open object
///
/// Data is only guaranteed to be visible after [`ObjectWriter::close`].
/// Callers must finish every writer with exactly one of `close` or `abort`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Commit everything written so far
    async fn close(&mut self) -> Result<()>;

    /// Release the handle after a failure; partial data may remain
    /// depending on the backend
    async fn abort(&mut self) -> Result<()>;
}

/// Capability set of a storage backend bound to one bucket, container or root
///
/// Implementations hold connection configuration only; they keep no state
/// between calls and may be shared across concurrent transfers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Human-readable URI for `path`, used in logs and errors
    fn location(&self, path: &str) -> String;

    /// Open `path` for sequential reading
    async fn open_reader(&self, path: &str) -> Result<Box<dyn ObjectReader>>;

    /// Open `path` for sequential writing, replacing any existing object
    async fn open_writer(&self, path: &str) -> Result<Box<dyn ObjectWriter>>;

    async fn stat(&self, path: &str) -> Result<ObjectStat>;

    /// Read a whole object into memory
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write a whole object from memory
    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete `path` and verify it is gone (see [`ensure_deleted`]).
    /// Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Generate a time-limited read URL
    async fn presign_read(&self, path: &str, expires_secs: u64) -> Result<String> {
        let _ = expires_secs;
        Err(Error::UnsupportedFeature(format!(
            "presigned reads are not supported for {}",
            self.location(path)
        )))
    }
}

/// Confirm that `path` no longer exists after a delete
///
/// Backends do not reliably report failed deletes, so the object is read
/// back. `NotFound` is the expected outcome; anything else, including the
/// object still being present, is an [`Error::DeleteVerification`].
pub async fn ensure_deleted<C>(client: &C, path: &str) -> Result<()>
where
    C: StorageClient + ?Sized,
{
    match client.stat(path).await {
        Err(e) if e.is_not_found() => Ok(()),
        Ok(stat) => Err(Error::DeleteVerification {
            location: client.location(path),
            reason: format!("object still present ({} bytes)", stat.content_length),
        }),
        Err(e) => {
            tracing::error!(location = %client.location(path), error = %e, "Delete verification failed");
            Err(Error::DeleteVerification {
                location: client.location(path),
                reason: e.to_string(),
            })
        }
    }
}
