//! Persistence for the singleton remote-store settings row.

use crate::models::settings::{SETTINGS_ID, Settings};
use crate::services::sync_engine::SyncResult;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

const SELECT_COLUMNS: &str = "access_key_id, secret_access_key, region, bucket, endpoint";

#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<SqlitePool>,
}

impl SettingsStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Load the stored settings, or defaults when nothing was saved yet.
    pub async fn load(&self) -> SyncResult<Settings> {
        let settings = sqlx::query_as::<_, Settings>(&format!(
            "SELECT {SELECT_COLUMNS} FROM settings WHERE id = ?"
        ))
        .bind(SETTINGS_ID)
        .fetch_optional(&*self.db)
        .await?;
        Ok(settings.unwrap_or_default())
    }

    /// Persist new settings onto the singleton row.
    ///
    /// A blank incoming secret means "keep the stored secret": the UI never
    /// reads the secret back, so an unchanged form submits it empty.
    pub async fn save(&self, incoming: Settings) -> SyncResult<Settings> {
        let mut settings = incoming;
        if settings.secret_access_key.is_empty() {
            settings.secret_access_key = self.load().await?.secret_access_key;
        }

        sqlx::query(
            "INSERT INTO settings (id, access_key_id, secret_access_key, region, bucket, \
             endpoint, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 access_key_id = excluded.access_key_id, \
                 secret_access_key = excluded.secret_access_key, \
                 region = excluded.region, \
                 bucket = excluded.bucket, \
                 endpoint = excluded.endpoint, \
                 updated_at = excluded.updated_at",
        )
        .bind(SETTINGS_ID)
        .bind(&settings.access_key_id)
        .bind(&settings.secret_access_key)
        .bind(&settings.region)
        .bind(&settings.bucket)
        .bind(&settings.endpoint)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        Ok(settings)
    }
}
