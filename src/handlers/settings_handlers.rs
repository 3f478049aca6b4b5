//! Handlers for the singleton remote-store settings.
//!
//! Saving settings also rebuilds the S3 client and swaps it into the running
//! engine, so changes take effect without a restart.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::settings::Settings,
    remote::s3::S3RemoteStore,
};
use axum::{Json, extract::State};
use std::sync::Arc;
use tracing::info;

/// GET `/api/settings` — current settings, secret omitted.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, AppError> {
    let settings = state.settings.load().await?;
    Ok(Json(settings))
}

/// PUT `/api/settings` — persist settings and reconfigure the remote store.
///
/// A blank secret in the payload keeps the stored one.
pub async fn put_settings(
    State(state): State<AppState>,
    Json(incoming): Json<Settings>,
) -> Result<Json<Settings>, AppError> {
    let saved = state.settings.save(incoming).await?;

    let remote = Arc::new(S3RemoteStore::new(&saved));
    state.engine.replace_remote(remote).await;
    info!("settings saved for bucket `{}`", saved.bucket);

    Ok(Json(saved))
}
