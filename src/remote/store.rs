//! Contract for the S3-compatible remote store.
//!
//! The bucket is the source of truth for object content; the local index
//! only mirrors metadata. Everything the sync engine needs from the bucket
//! goes through this trait so tests can substitute an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Signed URLs default to this expiry unless the caller asks otherwise.
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(900);

/// Cumulative transfer progress: `(bytes_transferred, bytes_total)`.
///
/// Fire-and-forget: implementations invoke it inline zero or more times and
/// its outcome never affects the transfer.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Metadata returned by a HEAD request.
#[derive(Debug, Clone)]
pub struct RemoteHead {
    pub content_type: Option<String>,
    pub content_length: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A streamed object body.
pub struct RemoteObjectBody {
    pub content_length: Option<i64>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// One entry of a full bucket listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote object `{0}` not found")]
    NotFound(String),
    #[error("access denied for `{0}`: {1}")]
    AccessDenied(String, String),
    #[error("remote request for `{0}` failed: {1}")]
    Request(String, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Operations the sync engine performs against the remote bucket.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch object metadata. Fails with [`RemoteError::NotFound`] when the
    /// key is absent remotely.
    async fn head_object(&self, key: &str) -> Result<RemoteHead, RemoteError>;

    /// Fetch an object body as a stream.
    async fn get_object(&self, key: &str) -> Result<RemoteObjectBody, RemoteError>;

    /// Upload a local file to `key`, reporting cumulative bytes through
    /// `progress` when given.
    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
        progress: Option<ProgressFn>,
    ) -> Result<(), RemoteError>;

    /// Create a zero-byte marker object (folder placeholder).
    async fn put_object(&self, key: &str) -> Result<(), RemoteError>;

    /// Batched delete, tolerant of keys that are already absent.
    async fn delete_objects(&self, keys: &[String]) -> Result<(), RemoteError>;

    /// Issue a time-limited read URL; `None` uses
    /// [`DEFAULT_SIGNED_URL_EXPIRY`].
    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, RemoteError>;

    /// Complete bucket listing, used for a full index rebuild.
    async fn list_all_objects(&self) -> Result<Vec<RemoteEntry>, RemoteError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn head_object(&self, key: &str) -> Result<RemoteHead, RemoteError> {
        (**self).head_object(key).await
    }

    async fn get_object(&self, key: &str) -> Result<RemoteObjectBody, RemoteError> {
        (**self).get_object(key).await
    }

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
        progress: Option<ProgressFn>,
    ) -> Result<(), RemoteError> {
        (**self).upload(key, source, content_type, progress).await
    }

    async fn put_object(&self, key: &str) -> Result<(), RemoteError> {
        (**self).put_object(key).await
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), RemoteError> {
        (**self).delete_objects(keys).await
    }

    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, RemoteError> {
        (**self).get_signed_url(key, expires_in).await
    }

    async fn list_all_objects(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        (**self).list_all_objects().await
    }
}
