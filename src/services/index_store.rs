//! src/services/index_store.rs
//!
//! ObjectIndex — the local SQLite table of object records. The index is the
//! single source of truth for hierarchy metadata; the remote bucket owns the
//! bytes. Query predicates arrive as structured [`ObjectFilter`] values and
//! are translated into SQL here, nowhere else.

use crate::models::object::{ObjectKind, ObjectRecord};
use crate::services::path_util::{basename_of, dirname_of, folder_path, like_pattern};
use crate::services::sync_engine::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;

const SELECT_COLUMNS: &str = "id, kind, path, dirname, basename, size, storage_class, \
     last_modified, created_at, updated_at";

/// How a listing scopes the directory column.
#[derive(Debug, Clone)]
pub enum DirnameMatch {
    /// Direct children only (plain listing).
    Exact(String),
    /// The directory and everything beneath it (keyword search).
    Prefix(String),
}

/// Resume-after position of a seek-paginated listing.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub kind: ObjectKind,
    pub basename: String,
    pub id: i64,
}

impl From<&ObjectRecord> for Cursor {
    fn from(record: &ObjectRecord) -> Self {
        Cursor {
            kind: record.kind,
            basename: record.basename.clone(),
            id: record.id,
        }
    }
}

/// Structured predicate for [`ObjectIndex::find_page`].
#[derive(Debug, Clone)]
pub struct ObjectFilter {
    pub dirname: DirnameMatch,
    /// Substrings every matching path must contain.
    pub plus: Vec<String>,
    /// Substrings no matching path may contain.
    pub minus: Vec<String>,
    pub after: Option<Cursor>,
}

/// Repository over the `objects` table.
#[derive(Clone)]
pub struct ObjectIndex {
    db: Arc<SqlitePool>,
}

impl ObjectIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new record, deriving `dirname`/`basename` from the path.
    ///
    /// A unique-path collision maps to [`SyncError::DuplicatePath`]; nothing
    /// is written in that case.
    pub async fn insert(&self, kind: ObjectKind, path: &str) -> SyncResult<ObjectRecord> {
        let now = Utc::now();
        let storage_class = match kind {
            ObjectKind::File => Some("STANDARD"),
            ObjectKind::Folder => None,
        };

        let result = sqlx::query_as::<_, ObjectRecord>(&format!(
            "INSERT INTO objects (kind, path, dirname, basename, size, storage_class, \
             last_modified, created_at, updated_at) \
             VALUES (?, ?, ?, ?, NULL, ?, NULL, ?, ?) \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(kind)
        .bind(path)
        .bind(dirname_of(path))
        .bind(basename_of(path))
        .bind(storage_class)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(err) if is_unique_violation(&err) => {
                Err(SyncError::DuplicatePath(path.to_string()))
            }
            Err(err) => Err(SyncError::Sqlx(err)),
        }
    }

    /// Insert-or-update keyed on the unique path. Used by resync, where the
    /// same folder prefix can be derived from several listing entries.
    pub async fn upsert(
        &self,
        kind: ObjectKind,
        path: &str,
        size: Option<i64>,
        storage_class: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> SyncResult<ObjectRecord> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, ObjectRecord>(&format!(
            "INSERT INTO objects (kind, path, dirname, basename, size, storage_class, \
             last_modified, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(path) DO UPDATE SET \
                 kind = excluded.kind, \
                 size = excluded.size, \
                 storage_class = excluded.storage_class, \
                 last_modified = excluded.last_modified, \
                 updated_at = excluded.updated_at \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(kind)
        .bind(path)
        .bind(dirname_of(path))
        .bind(basename_of(path))
        .bind(size)
        .bind(storage_class)
        .bind(last_modified)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }

    pub async fn find_by_id(&self, id: i64) -> SyncResult<Option<ObjectRecord>> {
        let record = sqlx::query_as::<_, ObjectRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM objects WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    pub async fn find_by_ids(&self, ids: &[i64]) -> SyncResult<Vec<ObjectRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SELECT_COLUMNS} FROM objects WHERE id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");
        let records = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(records)
    }

    pub async fn find_by_path(&self, path: &str) -> SyncResult<Option<ObjectRecord>> {
        let record = sqlx::query_as::<_, ObjectRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM objects WHERE path = ?"
        ))
        .bind(path)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// All records whose path is prefixed by `folder_path`, the folder's own
    /// marker record included. `folder_path` must end with `/`.
    pub async fn find_descendants(&self, folder_path: &str) -> SyncResult<Vec<ObjectRecord>> {
        let records = sqlx::query_as::<_, ObjectRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM objects WHERE path LIKE ? ESCAPE '\\' ORDER BY id ASC"
        ))
        .bind(like_pattern(folder_path, true))
        .fetch_all(&*self.db)
        .await?;
        Ok(records)
    }

    /// One page of a listing, ordered by `(kind, basename, id)` ascending.
    ///
    /// The compound resume-after predicate implements seek pagination:
    /// concurrent inserts can never shift already-seen rows into a later
    /// page the way offset pagination does.
    pub async fn find_page(&self, filter: &ObjectFilter, limit: i64) -> SyncResult<Vec<ObjectRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SELECT_COLUMNS} FROM objects WHERE 1 = 1"
        ));

        match &filter.dirname {
            DirnameMatch::Exact(dirname) => {
                builder.push(" AND dirname = ");
                builder.push_bind(dirname.clone());
            }
            DirnameMatch::Prefix(dirname) => {
                // Descendants have a dirname of exactly `d` or starting with
                // `d/`; a bare `d%` pattern would also match siblings like
                // `d2`. An empty dirname scopes to the whole tree.
                if !dirname.is_empty() {
                    builder.push(" AND (dirname = ");
                    builder.push_bind(dirname.clone());
                    builder.push(" OR dirname LIKE ");
                    builder.push_bind(like_pattern(&folder_path(dirname), true));
                    builder.push(" ESCAPE '\\')");
                }
            }
        }

        for term in &filter.plus {
            builder.push(" AND path LIKE ");
            builder.push_bind(like_pattern(term, false));
            builder.push(" ESCAPE '\\'");
        }
        for term in &filter.minus {
            builder.push(" AND path NOT LIKE ");
            builder.push_bind(like_pattern(term, false));
            builder.push(" ESCAPE '\\'");
        }

        if let Some(cursor) = &filter.after {
            builder.push(" AND (kind > ");
            builder.push_bind(cursor.kind);
            builder.push(" OR (kind = ");
            builder.push_bind(cursor.kind);
            builder.push(" AND basename > ");
            builder.push_bind(cursor.basename.clone());
            builder.push(") OR (kind = ");
            builder.push_bind(cursor.kind);
            builder.push(" AND basename = ");
            builder.push_bind(cursor.basename.clone());
            builder.push(" AND id > ");
            builder.push_bind(cursor.id);
            builder.push("))");
        }

        builder.push(" ORDER BY kind ASC, basename ASC, id ASC LIMIT ");
        builder.push_bind(limit);

        let records = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(records)
    }

    /// Persist post-upload metadata onto a provisional file record.
    pub async fn update_file_metadata(
        &self,
        id: i64,
        size: i64,
        last_modified: Option<DateTime<Utc>>,
    ) -> SyncResult<ObjectRecord> {
        let record = sqlx::query_as::<_, ObjectRecord>(&format!(
            "UPDATE objects SET size = ?, last_modified = ?, updated_at = ? WHERE id = ? \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(size)
        .bind(last_modified)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        record.ok_or(SyncError::NotFound(id))
    }

    pub async fn destroy_many(&self, ids: &[i64]) -> SyncResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM objects WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");
        let result = builder.build().execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Drop every record. Used by resync before mirroring the live listing.
    pub async fn clear(&self) -> SyncResult<()> {
        sqlx::query("DELETE FROM objects").execute(&*self.db).await?;
        Ok(())
    }
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_index;

    #[tokio::test]
    async fn insert_derives_dirname_and_basename() {
        let index = memory_index().await;
        let folder = index.insert(ObjectKind::Folder, "docs/").await.unwrap();
        assert_eq!(folder.dirname, "");
        assert_eq!(folder.basename, "docs");

        let file = index.insert(ObjectKind::File, "docs/a.txt").await.unwrap();
        assert_eq!(file.dirname, "docs");
        assert_eq!(file.basename, "a.txt");
        assert_eq!(file.storage_class.as_deref(), Some("STANDARD"));
        assert!(file.id > folder.id);
    }

    #[tokio::test]
    async fn duplicate_path_fails_with_conflict() {
        let index = memory_index().await;
        index.insert(ObjectKind::File, "a.txt").await.unwrap();
        let err = index.insert(ObjectKind::File, "a.txt").await.unwrap_err();
        match err {
            SyncError::DuplicatePath(path) => assert_eq!(path, "a.txt"),
            other => panic!("expected DuplicatePath, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_descendants_includes_marker_and_nested() {
        let index = memory_index().await;
        index.insert(ObjectKind::Folder, "a/").await.unwrap();
        index.insert(ObjectKind::Folder, "a/b/").await.unwrap();
        index.insert(ObjectKind::File, "a/b/c.txt").await.unwrap();
        index.insert(ObjectKind::File, "ab.txt").await.unwrap();

        let descendants = index.find_descendants("a/").await.unwrap();
        let paths: Vec<&str> = descendants.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a/", "a/b/", "a/b/c.txt"]);
    }

    #[tokio::test]
    async fn find_page_orders_folders_before_files() {
        let index = memory_index().await;
        index.insert(ObjectKind::File, "a.txt").await.unwrap();
        index.insert(ObjectKind::Folder, "b/").await.unwrap();
        index.insert(ObjectKind::File, "c.txt").await.unwrap();

        let filter = ObjectFilter {
            dirname: DirnameMatch::Exact(String::new()),
            plus: Vec::new(),
            minus: Vec::new(),
            after: None,
        };
        let page = index.find_page(&filter, 10).await.unwrap();
        let paths: Vec<&str> = page.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["b/", "a.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn prefix_scope_excludes_sibling_directories() {
        let index = memory_index().await;
        index.insert(ObjectKind::Folder, "docs/").await.unwrap();
        index.insert(ObjectKind::File, "docs/a.txt").await.unwrap();
        index.insert(ObjectKind::File, "docs/sub/b.txt").await.unwrap();
        index.insert(ObjectKind::Folder, "docs2/").await.unwrap();
        index.insert(ObjectKind::File, "docs2/c.txt").await.unwrap();

        let filter = ObjectFilter {
            dirname: DirnameMatch::Prefix("docs".to_string()),
            plus: Vec::new(),
            minus: Vec::new(),
            after: None,
        };
        let page = index.find_page(&filter, 10).await.unwrap();
        let paths: Vec<&str> = page.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/a.txt", "docs/sub/b.txt"]);
    }

    #[tokio::test]
    async fn like_escape_keeps_wildcards_literal() {
        let index = memory_index().await;
        index.insert(ObjectKind::File, "100%_done.txt").await.unwrap();
        index.insert(ObjectKind::File, "100x-done.txt").await.unwrap();

        let filter = ObjectFilter {
            dirname: DirnameMatch::Prefix(String::new()),
            plus: vec!["100%".to_string()],
            minus: Vec::new(),
            after: None,
        };
        let page = index.find_page(&filter, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path, "100%_done.txt");
    }
}
