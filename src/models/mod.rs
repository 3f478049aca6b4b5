//! Core data models for the object index and its configuration.
//!
//! These entities map to SQLite tables via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod object;
pub mod settings;
