//! Defines routes for the bucket-mirroring API.
//!
//! ## Structure
//! - **Listing & detail**
//!   - `GET  /api/objects`        — list a directory or keyword-search it
//!   - `GET  /api/objects/{id}`   — one object with live remote metadata
//!
//! - **Mutations**
//!   - `POST /api/folders`        — create a virtual folder
//!   - `POST /api/files`          — upload a local file
//!   - `POST /api/objects/delete`   — delete objects, folders recursively
//!   - `POST /api/objects/download` — download objects to a local directory
//!   - `POST /api/resync`         — rebuild the index from the live bucket
//!
//! - **Settings**
//!   - `GET  /api/settings` / `PUT /api/settings`
//!
//! Bulk mutations are POST bodies rather than DELETE with ids in the URL so
//! a large selection never runs into URL length limits.

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    object_handlers::{
        create_file, create_folder, delete_objects, download_objects, get_object, list_objects,
        resync,
    },
    settings_handlers::{get_settings, put_settings},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the whole API.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // listing & detail
        .route("/api/objects", get(list_objects))
        .route("/api/objects/{id}", get(get_object))
        // mutations
        .route("/api/folders", post(create_folder))
        .route("/api/files", post(create_file))
        .route("/api/objects/delete", post(delete_objects))
        .route("/api/objects/download", post(download_objects))
        .route("/api/resync", post(resync))
        // settings
        .route("/api/settings", get(get_settings).put(put_settings))
}
