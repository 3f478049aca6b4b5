pub mod health_handlers;
pub mod object_handlers;
pub mod settings_handlers;

use crate::services::{settings_store::SettingsStore, sync_engine::SyncEngine};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub settings: SettingsStore,
    pub db: Arc<SqlitePool>,
}
