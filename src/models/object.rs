//! Represents an entry in the local object index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Whether an index entry is a virtual folder or a file.
///
/// The ordinals are part of the listing sort order (`kind ASC`): folders (0)
/// sort before files (1) at the same level. Pagination cursors embed this
/// ordering, so the values must never change.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum ObjectKind {
    Folder = 0,
    File = 1,
}

/// A single row of the local object index.
///
/// The index mirrors the remote bucket: the remote store owns the bytes, this
/// record owns the hierarchy metadata. Folder paths always end with `/`,
/// file paths never do, and `path` is globally unique.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Surrogate primary key, assigned at insertion in insertion order.
    pub id: i64,

    /// Folder or file.
    pub kind: ObjectKind,

    /// Full virtual path (`photos/2025/cat.jpg`, `photos/2025/`).
    pub path: String,

    /// Parent directory without trailing slash; empty at root level.
    pub dirname: String,

    /// Final path segment, folder trailing slash stripped.
    pub basename: String,

    /// Size in bytes; files only, set after a confirmed upload.
    pub size: Option<i64>,

    /// Storage class reported by the remote store (e.g. STANDARD).
    pub storage_class: Option<String>,

    /// Remote last-modified timestamp; files only.
    pub last_modified: Option<DateTime<Utc>>,

    /// When this row was created.
    pub created_at: DateTime<Utc>,

    /// When this row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ObjectRecord {
    /// Number of `/` separators in the path. Used to order folder deletions
    /// deepest-first.
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}
