//! HTTP handlers for browsing, creating, deleting, downloading, and
//! resyncing index objects. All heavy lifting is delegated to `SyncEngine`;
//! this layer only translates between JSON and engine types.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::object::ObjectRecord,
    remote::ProgressFn,
    services::sync_engine::{DownloadProgressFn, ListParams},
};
use axum::{
    Json,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_PAGE_SIZE: i64 = 100;

/// Query params accepted by the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Directory to list; omitted or empty means the root.
    pub dirname: Option<String>,
    /// Free-text search over the directory and everything beneath it.
    pub keyword: Option<String>,
    /// Opaque token from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub objects: Vec<ObjectRecord>,
    pub has_next_page: bool,
    /// Token resuming after the last returned object; absent on the final
    /// page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ObjectDetailResponse {
    pub object: ObjectRecord,
    pub content_type: Option<String>,
    pub content_length: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub signed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderReq {
    #[serde(default)]
    pub dirname: String,
    pub basename: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFileReq {
    #[serde(default)]
    pub dirname: String,
    /// Absolute path of the local file to upload.
    pub source: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ObjectIdsReq {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadReq {
    pub ids: Vec<i64>,
    /// Directory the selection was made in; stripped from downloaded paths.
    #[serde(default)]
    pub dirname: String,
    /// Local directory receiving the files.
    pub destination: PathBuf,
}

/// GET `/api/objects` — one page of a listing or keyword search.
pub async fn list_objects(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let after = q.cursor.as_deref().map(decode_cursor).transpose()?;

    let result = state
        .engine
        .list_objects(ListParams {
            dirname: q.dirname.unwrap_or_default(),
            keyword: q.keyword,
            after,
            limit: q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        })
        .await?;

    let next_cursor = if result.has_next_page {
        result.items.last().map(|record| encode_cursor(record.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        objects: result.items,
        has_next_page: result.has_next_page,
        next_cursor,
    }))
}

/// GET `/api/objects/{id}` — record plus live remote metadata.
pub async fn get_object(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<ObjectDetailResponse>, AppError> {
    let detail = state.engine.get_object(id).await?;
    Ok(Json(ObjectDetailResponse {
        object: detail.record,
        content_type: detail.head.content_type,
        content_length: detail.head.content_length,
        last_modified: detail.head.last_modified,
        signed_url: detail.signed_url,
    }))
}

/// POST `/api/folders` — create a virtual folder.
pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderReq>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.engine.create_folder(&req.dirname, &req.basename).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST `/api/files` — upload a local file into a folder.
pub async fn create_file(
    State(state): State<AppState>,
    Json(req): Json<CreateFileReq>,
) -> Result<impl IntoResponse, AppError> {
    let progress: ProgressFn = Arc::new(|transferred, total| {
        debug!("upload progress: {transferred}/{total} bytes");
    });
    let record = state
        .engine
        .create_file(&req.dirname, &req.source, Some(progress))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST `/api/objects/delete` — delete objects, folders recursively.
pub async fn delete_objects(
    State(state): State<AppState>,
    Json(req): Json<ObjectIdsReq>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_objects(&req.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/api/objects/download` — download objects beneath a local directory.
pub async fn download_objects(
    State(state): State<AppState>,
    Json(req): Json<DownloadReq>,
) -> Result<StatusCode, AppError> {
    let progress: DownloadProgressFn = Arc::new(|fraction| {
        debug!("download progress: {:.1}%", fraction * 100.0);
    });
    state
        .engine
        .download_objects(&req.destination, &req.dirname, &req.ids, Some(progress))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/api/resync` — rebuild the whole index from the live bucket.
pub async fn resync(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.engine.resync().await?;
    Ok(StatusCode::NO_CONTENT)
}

fn encode_cursor(id: i64) -> String {
    general_purpose::STANDARD.encode(id.to_string())
}

fn decode_cursor(token: &str) -> Result<i64, AppError> {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| AppError::bad_request(format!("malformed cursor token `{token}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_tokens_round_trip() {
        let token = encode_cursor(42);
        assert_eq!(decode_cursor(&token).unwrap(), 42);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        let err = decode_cursor("not-base64!").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
