//! aws-sdk-s3 implementation of [`RemoteStore`].
//!
//! The client is built from an explicit [`Settings`] record and never mutated
//! in place; changing settings means constructing a fresh instance and
//! swapping it into the engine.

use crate::models::settings::Settings;
use crate::remote::store::{
    DEFAULT_SIGNED_URL_EXPIRY, ProgressFn, RemoteEntry, RemoteError, RemoteHead, RemoteObjectBody,
    RemoteStore,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, warn};

/// Uploads larger than this go through the multipart API.
const MULTIPART_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;
const MULTIPART_PART_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// S3 limits a single DeleteObjects request to 1000 keys.
const DELETE_BATCH_MAX: usize = 1000;

/// Real S3 implementation of the remote store contract.
#[derive(Clone)]
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
}

impl S3RemoteStore {
    /// Build a client from the persisted settings record.
    ///
    /// An empty region falls back to `us-east-1`; a non-empty endpoint
    /// switches to path-style addressing for MinIO-style providers.
    pub fn new(settings: &Settings) -> Self {
        let region = if settings.region.trim().is_empty() {
            "us-east-1".to_string()
        } else {
            settings.region.trim().to_string()
        };

        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "bucket-pilot",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version_latest()
            .region(Region::new(region))
            .credentials_provider(credentials);

        let endpoint = settings.endpoint.trim();
        if !endpoint.is_empty() {
            builder = builder.endpoint_url(endpoint.to_string()).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }
}

/// Flatten an error and its source chain into one message.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        source = inner.source();
    }
    msg
}

fn request_error(key: &str, err: &dyn std::error::Error) -> RemoteError {
    let msg = error_chain(err);
    if msg.contains("AccessDenied") {
        RemoteError::AccessDenied(key.to_string(), msg)
    } else {
        RemoteError::Request(key.to_string(), msg)
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    dt.to_millis().ok().and_then(DateTime::<Utc>::from_timestamp_millis)
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn head_object(&self, key: &str) -> Result<RemoteHead, RemoteError> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_found() => RemoteError::NotFound(key.to_string()),
                _ => request_error(key, &e),
            })?;

        Ok(RemoteHead {
            content_type: resp.content_type().map(str::to_string),
            content_length: resp.content_length().unwrap_or(0),
            last_modified: resp.last_modified().and_then(to_chrono),
        })
    }

    async fn get_object(&self, key: &str) -> Result<RemoteObjectBody, RemoteError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => RemoteError::NotFound(key.to_string()),
                _ => request_error(key, &e),
            })?;

        Ok(RemoteObjectBody {
            content_length: resp.content_length(),
            reader: Box::new(resp.body.into_async_read()),
        })
    }

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
        progress: Option<ProgressFn>,
    ) -> Result<(), RemoteError> {
        let total = tokio::fs::metadata(source).await?.len();

        if total <= MULTIPART_THRESHOLD_BYTES {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|e| request_error(key, &e))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(body)
                .send()
                .await
                .map_err(|e| request_error(key, &e))?;

            if let Some(progress) = &progress {
                progress(total, total);
            }
            return Ok(());
        }

        self.upload_multipart(key, source, content_type, total, progress).await
    }

    async fn put_object(&self, key: &str) -> Result<(), RemoteError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from_static(&[]))
            .send()
            .await
            .map_err(|e| request_error(key, &e))?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), RemoteError> {
        for batch in keys.chunks(DELETE_BATCH_MAX) {
            let identifiers = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| request_error(key, &e))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| request_error(&batch[0], &e))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| request_error(&batch[0], &e))?;

            debug!("deleted batch of {} remote objects", batch.len());
        }
        Ok(())
    }

    async fn get_signed_url(
        &self,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, RemoteError> {
        let expiry = expires_in.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY);
        let config = PresigningConfig::expires_in(expiry).map_err(|e| request_error(key, &e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| request_error(key, &e))?;
        Ok(presigned.uri().to_string())
    }

    async fn list_all_objects(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| request_error(&self.bucket, &e))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                entries.push(RemoteEntry {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified: obj.last_modified().and_then(to_chrono),
                    storage_class: obj.storage_class().map(|sc| sc.as_str().to_string()),
                });
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("listed {} remote objects", entries.len());
        Ok(entries)
    }
}

impl S3RemoteStore {
    /// Multipart upload with per-part progress, aborted best-effort on error.
    async fn upload_multipart(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
        total: u64,
        progress: Option<ProgressFn>,
    ) -> Result<(), RemoteError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| request_error(key, &e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                RemoteError::Request(key.to_string(), "multipart upload id missing".into())
            })?
            .to_string();

        match self
            .upload_parts(key, source, &upload_id, total, progress)
            .await
        {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| request_error(key, &e))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("failed to abort multipart upload for {}: {}", key, abort_err);
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        source: &Path,
        upload_id: &str,
        total: u64,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<CompletedPart>, RemoteError> {
        let mut file = File::open(source).await?;
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut transferred = 0u64;

        loop {
            let mut buf = vec![0u8; MULTIPART_PART_SIZE_BYTES];
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            buf.truncate(filled);

            let resp = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(Bytes::from(buf)))
                .send()
                .await
                .map_err(|e| request_error(key, &e))?;

            let mut part = CompletedPart::builder().part_number(part_number);
            if let Some(etag) = resp.e_tag() {
                part = part.e_tag(etag);
            }
            parts.push(part.build());

            transferred += filled as u64;
            if let Some(progress) = &progress {
                progress(transferred, total);
            }
            part_number += 1;
        }

        Ok(parts)
    }
}
