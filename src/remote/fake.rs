//! In-memory [`RemoteStore`] used by the engine tests.
//!
//! Besides holding object bytes it records every delete batch in call order
//! and supports per-key fault injection, so tests can assert both the
//! outcome and the sequencing of remote calls.

use crate::remote::store::{
    DEFAULT_SIGNED_URL_EXPIRY, ProgressFn, RemoteEntry, RemoteError, RemoteHead, RemoteObjectBody,
    RemoteStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone)]
struct FakeObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory remote store with fault injection.
#[derive(Clone, Default)]
pub struct FakeRemoteStore {
    objects: Arc<Mutex<HashMap<String, FakeObject>>>,
    delete_batches: Arc<Mutex<Vec<Vec<String>>>>,
    fail_objects: Arc<Mutex<HashSet<String>>>,
    fail_uploads: Arc<Mutex<HashSet<String>>>,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with the given bytes.
    pub async fn add_object(&self, key: &str, data: Bytes, content_type: &str) {
        let mut objects = self.objects.lock().await;
        objects.insert(
            key.to_string(),
            FakeObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
    }

    /// Make head/get for `key` fail with NotFound from now on.
    pub async fn fake_fail_object(&self, key: &str) {
        self.fail_objects.lock().await.insert(key.to_string());
    }

    /// Make uploads to `key` fail.
    pub async fn fake_fail_upload(&self, key: &str) {
        self.fail_uploads.lock().await.insert(key.to_string());
    }

    /// All stored keys, sorted.
    pub async fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn has_object(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    /// Every `delete_objects` batch, in call order.
    pub async fn delete_batches(&self) -> Vec<Vec<String>> {
        self.delete_batches.lock().await.clone()
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn head_object(&self, key: &str) -> Result<RemoteHead, RemoteError> {
        if self.fail_objects.lock().await.contains(key) {
            return Err(RemoteError::NotFound(key.to_string()));
        }
        let objects = self.objects.lock().await;
        match objects.get(key) {
            Some(obj) => Ok(RemoteHead {
                content_type: Some(obj.content_type.clone()),
                content_length: obj.data.len() as i64,
                last_modified: Some(obj.last_modified),
            }),
            None => Err(RemoteError::NotFound(key.to_string())),
        }
    }

    async fn get_object(&self, key: &str) -> Result<RemoteObjectBody, RemoteError> {
        if self.fail_objects.lock().await.contains(key) {
            return Err(RemoteError::NotFound(key.to_string()));
        }
        let objects = self.objects.lock().await;
        match objects.get(key) {
            Some(obj) => Ok(RemoteObjectBody {
                content_length: Some(obj.data.len() as i64),
                reader: Box::new(Cursor::new(obj.data.to_vec())),
            }),
            None => Err(RemoteError::NotFound(key.to_string())),
        }
    }

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
        progress: Option<ProgressFn>,
    ) -> Result<(), RemoteError> {
        if self.fail_uploads.lock().await.contains(key) {
            return Err(RemoteError::Request(key.to_string(), "injected upload failure".into()));
        }
        let data = tokio::fs::read(source).await?;
        let total = data.len() as u64;
        self.add_object(key, Bytes::from(data), content_type).await;
        if let Some(progress) = &progress {
            progress(total, total);
        }
        Ok(())
    }

    async fn put_object(&self, key: &str) -> Result<(), RemoteError> {
        if self.fail_uploads.lock().await.contains(key) {
            return Err(RemoteError::Request(key.to_string(), "injected put failure".into()));
        }
        self.add_object(key, Bytes::new(), "application/octet-stream").await;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), RemoteError> {
        let mut objects = self.objects.lock().await;
        for key in keys {
            // Tolerant of already-absent keys, like a real bucket.
            objects.remove(key);
        }
        self.delete_batches.lock().await.push(keys.to_vec());
        Ok(())
    }

    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, RemoteError> {
        let expiry = expires_in.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY);
        Ok(format!("https://fake.invalid/{key}?expires={}", expiry.as_secs()))
    }

    async fn list_all_objects(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let objects = self.objects.lock().await;
        let mut entries: Vec<RemoteEntry> = objects
            .iter()
            .map(|(key, obj)| RemoteEntry {
                key: key.clone(),
                size: obj.data.len() as i64,
                last_modified: Some(obj.last_modified),
                storage_class: Some("STANDARD".to_string()),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}
