use crate::remote::RemoteError;
use crate::services::sync_engine::SyncError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for handler errors that keeps the message local.
///
/// Conflicts additionally carry the machine-readable operation code and the
/// path that collided, so clients can react without parsing the message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub operation: Option<&'static str>,
    pub path: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            operation: None,
            path: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// 409 Conflict for a path that already has an object.
    pub fn duplicate_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            status: StatusCode::CONFLICT,
            message: format!("an object already exists at `{path}`"),
            operation: Some("duplicate-path"),
            path: Some(path),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(operation) = self.operation {
            body["operation"] = json!(operation);
        }
        if let Some(path) = &self.path {
            body["path"] = json!(path);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::DuplicatePath(path) => AppError::duplicate_path(path),
            SyncError::NotFound(_) | SyncError::MissingIds(_) | SyncError::CursorNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            SyncError::ParentNotFound(_) => AppError::not_found(err.to_string()),
            SyncError::InvalidName(_) | SyncError::InvalidSource(_) => {
                AppError::bad_request(err.to_string())
            }
            SyncError::Remote(RemoteError::NotFound(key)) => {
                AppError::not_found(format!("remote object `{key}` not found"))
            }
            SyncError::Remote(remote) => {
                AppError::new(StatusCode::BAD_GATEWAY, remote.to_string())
            }
            SyncError::Sqlx(_) | SyncError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
