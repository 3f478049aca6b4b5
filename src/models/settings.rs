//! Remote-store connection settings, persisted as a singleton row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fixed primary key of the singleton settings row.
pub const SETTINGS_ID: i64 = 1;

/// Connection settings for the S3-compatible remote store.
///
/// The secret is write-only: it is skipped when serializing responses, and an
/// update with a blank secret keeps the previously stored value.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, Default)]
pub struct Settings {
    pub access_key_id: String,

    #[serde(skip_serializing, default)]
    pub secret_access_key: String,

    /// Region the bucket lives in (e.g. "us-east-1").
    pub region: String,

    /// Bucket mirrored into the local index.
    pub bucket: String,

    /// Custom endpoint for non-AWS providers; empty for AWS.
    pub endpoint: String,
}
