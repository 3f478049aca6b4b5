//! src/services/sync_engine.rs
//!
//! SyncEngine — orchestrates folder/file creation, recursive deletion,
//! recursive download, listings, and full-bucket resynchronization, keeping
//! the local index consistent with the remote bucket under partial failure.
//!
//! Ordering disciplines:
//! - creates are local-first: a unique-path collision never reaches the
//!   remote store;
//! - a file upload that fails after the provisional insert is compensated by
//!   deleting the provisional record;
//! - bulk operations validate every requested id before mutating anything;
//! - folder expansion and per-file downloads run strictly one at a time,
//!   remote deletion and index destruction for a batch run as concurrent
//!   independent failure domains.

use crate::models::object::{ObjectKind, ObjectRecord};
use crate::remote::store::{ProgressFn, RemoteError, RemoteHead, RemoteStore};
use crate::services::index_store::{Cursor, DirnameMatch, ObjectFilter, ObjectIndex};
use crate::services::path_util::{folder_path, join_path, parse_keyword};
use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Signed URLs for image previews last one hour.
const IMAGE_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(3600);

const DOWNLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("object `{0}` not found")]
    NotFound(i64),
    #[error("objects not found: {0:?}")]
    MissingIds(Vec<i64>),
    #[error("pagination cursor `{0}` not found")]
    CursorNotFound(i64),
    #[error("parent folder `{0}` does not exist")]
    ParentNotFound(String),
    #[error("an object already exists at `{0}`")]
    DuplicatePath(String),
    #[error("invalid name `{0}`")]
    InvalidName(String),
    #[error("invalid upload source `{0}`")]
    InvalidSource(PathBuf),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Parameters of a listing request.
#[derive(Debug, Clone)]
pub struct ListParams {
    /// Directory to list; empty string is the root.
    pub dirname: String,
    /// Free-text search; when present the listing spans all descendants.
    pub keyword: Option<String>,
    /// Resume after this record id (seek pagination).
    pub after: Option<i64>,
    pub limit: i64,
}

#[derive(Debug)]
pub struct ListResult {
    pub items: Vec<ObjectRecord>,
    pub has_next_page: bool,
}

/// A single object joined with its live remote metadata.
#[derive(Debug)]
pub struct ObjectDetail {
    pub record: ObjectRecord,
    pub head: RemoteHead,
    /// Present for image and video content types.
    pub signed_url: Option<String>,
}

/// Overall download progress as a fraction in `0.0..=1.0`.
pub type DownloadProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Orchestrates the object index and the remote store.
///
/// Holds no cache of its own: hierarchy state is always re-read from the
/// index, which keeps the index the single source of truth.
#[derive(Clone)]
pub struct SyncEngine {
    index: ObjectIndex,
    remote: Arc<RwLock<Arc<dyn RemoteStore>>>,
}

impl SyncEngine {
    pub fn new(index: ObjectIndex, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            index,
            remote: Arc::new(RwLock::new(remote)),
        }
    }

    pub fn index(&self) -> &ObjectIndex {
        &self.index
    }

    /// Swap in a freshly constructed remote store (after a settings change).
    /// The old instance is never mutated, only replaced.
    pub async fn replace_remote(&self, remote: Arc<dyn RemoteStore>) {
        *self.remote.write().await = remote;
        info!("remote store reconfigured");
    }

    async fn remote(&self) -> Arc<dyn RemoteStore> {
        self.remote.read().await.clone()
    }

    /// List one page of objects under `dirname`.
    ///
    /// Without a keyword the listing is shallow (direct children only); with
    /// a keyword it spans all descendants. Deliberate divergence: browsing
    /// is per-level, search is recursive.
    pub async fn list_objects(&self, params: ListParams) -> SyncResult<ListResult> {
        let limit = params.limit.clamp(1, 1000);

        let keyword = params
            .keyword
            .as_deref()
            .map(parse_keyword)
            .filter(|kw| !kw.plus.is_empty() || !kw.minus.is_empty());

        let dirname = match &keyword {
            Some(_) => DirnameMatch::Prefix(params.dirname.clone()),
            None => DirnameMatch::Exact(params.dirname.clone()),
        };
        let (plus, minus) = keyword.map(|kw| (kw.plus, kw.minus)).unwrap_or_default();

        let after = match params.after {
            Some(id) => {
                let record = self
                    .index
                    .find_by_id(id)
                    .await?
                    .ok_or(SyncError::CursorNotFound(id))?;
                Some(Cursor::from(&record))
            }
            None => None,
        };

        let filter = ObjectFilter {
            dirname,
            plus,
            minus,
            after,
        };

        // Fetch one extra row to learn whether another page exists.
        let mut items = self.index.find_page(&filter, limit + 1).await?;
        let has_next_page = items.len() as i64 > limit;
        items.truncate(limit as usize);

        Ok(ListResult {
            items,
            has_next_page,
        })
    }

    /// Fetch one record together with live remote metadata and, for images
    /// and videos, a time-limited signed URL.
    pub async fn get_object(&self, id: i64) -> SyncResult<ObjectDetail> {
        let record = self
            .index
            .find_by_id(id)
            .await?
            .ok_or(SyncError::NotFound(id))?;

        let remote = self.remote().await;
        let head = remote.head_object(&record.path).await?;

        let signed_url = match head.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => Some(
                remote
                    .get_signed_url(&record.path, Some(IMAGE_SIGNED_URL_EXPIRY))
                    .await?,
            ),
            Some(ct) if ct.starts_with("video/") => {
                Some(remote.get_signed_url(&record.path, None).await?)
            }
            _ => None,
        };

        Ok(ObjectDetail {
            record,
            head,
            signed_url,
        })
    }

    /// Create a virtual folder under `dirname`.
    ///
    /// The index insert happens first; only after it succeeds is the remote
    /// marker written, so a duplicate name can never orphan a remote marker.
    pub async fn create_folder(&self, dirname: &str, basename: &str) -> SyncResult<ObjectRecord> {
        if basename.is_empty() || basename == "." || basename == ".." || basename.contains('/') {
            return Err(SyncError::InvalidName(basename.to_string()));
        }
        self.ensure_parent_exists(dirname).await?;

        let path = join_path(dirname, &format!("{basename}/"));
        let record = self.index.insert(ObjectKind::Folder, &path).await?;

        self.remote().await.put_object(&record.path).await?;
        debug!("created folder {}", record.path);
        Ok(record)
    }

    /// Upload a local file as `dirname/<source file name>`.
    ///
    /// A provisional record is inserted before the transfer; if the upload or
    /// the post-upload confirmation fails, the record is deleted again — the
    /// index never points at unconfirmed remote content.
    pub async fn create_file(
        &self,
        dirname: &str,
        source: &Path,
        progress: Option<ProgressFn>,
    ) -> SyncResult<ObjectRecord> {
        let basename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SyncError::InvalidSource(source.to_path_buf()))?;
        self.ensure_parent_exists(dirname).await?;

        let path = join_path(dirname, basename);
        let record = self.index.insert(ObjectKind::File, &path).await?;

        match self.upload_and_confirm(&record, source, progress).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if let Err(cleanup) = self.index.destroy_many(&[record.id]).await {
                    warn!(
                        "failed to remove provisional record {} after upload failure: {}",
                        record.id, cleanup
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_and_confirm(
        &self,
        record: &ObjectRecord,
        source: &Path,
        progress: Option<ProgressFn>,
    ) -> SyncResult<ObjectRecord> {
        let content_type = mime_guess::from_path(source)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let remote = self.remote().await;
        remote
            .upload(&record.path, source, &content_type, progress)
            .await?;

        // The bucket is authoritative for size and timestamp.
        let head = remote.head_object(&record.path).await?;
        let updated = self
            .index
            .update_file_metadata(record.id, head.content_length, head.last_modified)
            .await?;
        debug!("uploaded {} ({} bytes)", updated.path, head.content_length);
        Ok(updated)
    }

    /// Delete the given objects, folders recursively.
    ///
    /// All ids are validated before any mutation. Remote deletion and index
    /// destruction for each batch run concurrently; folder markers are
    /// removed deepest-first.
    pub async fn delete_objects(&self, ids: &[i64]) -> SyncResult<()> {
        let records = self.resolve_ids(ids).await?;

        let mut files = Vec::new();
        let mut folders = Vec::new();
        let mut seen = HashSet::new();

        // One expansion in flight at a time, to bound load on the index.
        for record in records {
            match record.kind {
                ObjectKind::File => {
                    if seen.insert(record.id) {
                        files.push(record);
                    }
                }
                ObjectKind::Folder => {
                    let descendants = self.index.find_descendants(&record.path).await?;
                    for descendant in descendants {
                        if !seen.insert(descendant.id) {
                            continue;
                        }
                        match descendant.kind {
                            ObjectKind::File => files.push(descendant),
                            ObjectKind::Folder => folders.push(descendant),
                        }
                    }
                }
            }
        }

        let remote = self.remote().await;

        if !files.is_empty() {
            let paths: Vec<String> = files.iter().map(|r| r.path.clone()).collect();
            let ids: Vec<i64> = files.iter().map(|r| r.id).collect();
            let (remote_result, index_result) =
                tokio::join!(remote.delete_objects(&paths), self.index.destroy_many(&ids));
            remote_result?;
            index_result?;
        }

        if !folders.is_empty() {
            // Deepest markers first, so the adapter never has to delete a
            // branch before its leaves.
            folders.sort_by(|a, b| b.depth().cmp(&a.depth()));
            let paths: Vec<String> = folders.iter().map(|r| r.path.clone()).collect();
            let ids: Vec<i64> = folders.iter().map(|r| r.id).collect();
            let (remote_result, index_result) =
                tokio::join!(remote.delete_objects(&paths), self.index.destroy_many(&ids));
            remote_result?;
            index_result?;
        }

        Ok(())
    }

    /// Download the given objects (folders recursively) beneath `local_root`,
    /// stripping the `dirname` prefix so the nested structure is preserved
    /// relative to the requested directory.
    pub async fn download_objects(
        &self,
        local_root: &Path,
        dirname: &str,
        ids: &[i64],
        progress: Option<DownloadProgressFn>,
    ) -> SyncResult<()> {
        let records = self.resolve_ids(ids).await?;

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            match record.kind {
                ObjectKind::File => {
                    if seen.insert(record.id) {
                        files.push(record);
                    }
                }
                ObjectKind::Folder => {
                    let descendants = self.index.find_descendants(&record.path).await?;
                    for descendant in descendants {
                        if descendant.kind == ObjectKind::File && seen.insert(descendant.id) {
                            files.push(descendant);
                        }
                    }
                }
            }
        }

        let strip_prefix = if dirname.is_empty() {
            String::new()
        } else {
            folder_path(dirname)
        };
        let remote = self.remote().await;
        let file_count = files.len();

        // Strictly one transfer at a time; each file owns 1/file_count of
        // the progress budget, interpolated by bytes within the file.
        for (position, record) in files.iter().enumerate() {
            let relative = record
                .path
                .strip_prefix(strip_prefix.as_str())
                .unwrap_or(&record.path);
            let dest = local_root.join(relative);

            self.download_one(remote.as_ref(), record, &dest, |fraction| {
                if let Some(progress) = &progress {
                    progress((position as f64 + fraction) / file_count as f64);
                }
            })
            .await?;
        }

        Ok(())
    }

    async fn download_one(
        &self,
        remote: &dyn RemoteStore,
        record: &ObjectRecord,
        dest: &Path,
        report: impl Fn(f64),
    ) -> SyncResult<()> {
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| SyncError::InvalidSource(dest.to_path_buf()))?;
        fs::create_dir_all(&parent).await?;

        let mut body = remote.get_object(&record.path).await?;
        let total = record
            .size
            .or(body.content_length)
            .filter(|len| *len > 0)
            .unwrap_or(0) as u64;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut written = 0u64;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK_BYTES];
        loop {
            let n = match body.reader.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(SyncError::Io(err));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(err) = file.write_all(&buf[..n]).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(SyncError::Io(err));
            }
            written += n as u64;
            if total > 0 {
                report((written as f64 / total as f64).min(1.0));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SyncError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, dest).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(dest).await?;
                fs::rename(&tmp_path, dest).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(SyncError::Io(err));
            }
        }

        report(1.0);
        debug!("downloaded {} to {}", record.path, dest.display());
        Ok(())
    }

    /// Rebuild the whole index from the live bucket listing.
    ///
    /// Keys ending in `/` become folder records; every other key becomes a
    /// file record. Ancestor folders without a marker object are
    /// synthesized, parents inserted before children.
    pub async fn resync(&self) -> SyncResult<()> {
        let remote = self.remote().await;
        let entries = remote.list_all_objects().await?;

        self.index.clear().await?;

        let mut folder_paths = BTreeSet::new();
        let mut file_entries = Vec::new();
        for entry in entries {
            for (pos, _) in entry.key.match_indices('/') {
                folder_paths.insert(entry.key[..=pos].to_string());
            }
            if !entry.key.ends_with('/') {
                file_entries.push(entry);
            }
        }

        // BTreeSet iteration is lexicographic, so a parent folder always
        // precedes its children.
        for path in &folder_paths {
            self.index
                .upsert(ObjectKind::Folder, path, None, None, None)
                .await?;
        }
        for entry in &file_entries {
            self.index
                .upsert(
                    ObjectKind::File,
                    &entry.key,
                    Some(entry.size),
                    Some(entry.storage_class.as_deref().unwrap_or("STANDARD")),
                    entry.last_modified,
                )
                .await?;
        }

        info!(
            "resynced index from remote listing: {} folders, {} files",
            folder_paths.len(),
            file_entries.len()
        );
        Ok(())
    }

    /// Non-root creates require the parent folder record to exist already.
    async fn ensure_parent_exists(&self, dirname: &str) -> SyncResult<()> {
        if dirname.is_empty() {
            return Ok(());
        }
        let parent = self.index.find_by_path(&folder_path(dirname)).await?;
        match parent {
            Some(record) if record.kind == ObjectKind::Folder => Ok(()),
            _ => Err(SyncError::ParentNotFound(dirname.to_string())),
        }
    }

    /// Resolve every requested id, failing with the full set of missing ids
    /// before any mutation takes place. Repeated ids resolve once.
    async fn resolve_ids(&self, ids: &[i64]) -> SyncResult<Vec<ObjectRecord>> {
        let mut seen = HashSet::new();
        let unique: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let records = self.index.find_by_ids(&unique).await?;
        if records.len() != unique.len() {
            let found: HashSet<i64> = records.iter().map(|r| r.id).collect();
            let missing: Vec<i64> = unique
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            return Err(SyncError::MissingIds(missing));
        }
        // Preserve the caller's ordering.
        let mut by_id: std::collections::HashMap<i64, ObjectRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        Ok(unique.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
