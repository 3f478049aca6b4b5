//! Shared helpers for unit tests: in-memory SQLite with the schema applied.

use crate::services::index_store::ObjectIndex;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;

/// Fresh in-memory database with all migrations applied.
///
/// A single connection is mandatory: every `:memory:` connection is its own
/// database, so a larger pool would scatter the schema.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");

    let sql = include_str!("../migrations/0001_init.sql");
    for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt)
            .execute(&pool)
            .await
            .expect("migration statement should apply");
    }

    Arc::new(pool)
}

pub async fn memory_index() -> ObjectIndex {
    ObjectIndex::new(memory_pool().await)
}
