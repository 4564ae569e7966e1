//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Camera status values. Status only changes through the explicit
/// online/offline transitions, never through frame ingestion.
pub const CAMERA_ONLINE: &str = "ONLINE";
pub const CAMERA_OFFLINE: &str = "OFFLINE";

/// A persisted emotion record. `camera_id` is a loose reference: records
/// survive camera deletion, and nothing enforces integrity.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct EmotionRow {
    pub id: i64,
    pub camera_id: Option<i64>,
    #[serde(rename = "timestamp")]
    pub recorded_at: DateTime<Utc>,
    /// Normalized dominant category.
    pub label: String,
    pub confidence: f64,
    pub face_detected: bool,
    /// Per-category score mapping, when the record came from the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotions: Option<serde_json::Value>,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_url: Option<String>,
}

/// A registered camera.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CameraRow {
    pub id: i64,
    pub name: String,
    #[serde(rename = "streamUrl")]
    pub stream_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
