//! Emotion record domain - append-only writes and ordered history reads
//!
//! All functions use the generic Executor pattern, allowing them to work
//! with both `&PgPool` (for standalone queries) and `&mut PgConnection`
//! (for transactions). Records are never updated, only appended and read.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::models::EmotionRow;

/// Fields for one appended record. `emotions`, `bbox`, and `metadata` stay
/// free-form JSON documents.
#[derive(Debug)]
pub struct NewEmotionRecord<'a> {
    pub camera_id: Option<i64>,
    pub recorded_at: DateTime<Utc>,
    pub label: &'a str,
    pub confidence: f64,
    pub face_detected: bool,
    pub emotions: Option<serde_json::Value>,
    pub bbox: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub frame_url: Option<&'a str>,
}

/// Append a record and return the stored row with its generated id.
pub async fn insert_record<'e, E>(
    executor: E,
    record: NewEmotionRecord<'_>,
) -> Result<EmotionRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO emotion_records
            (camera_id, recorded_at, label, confidence, face_detected,
             emotions, bbox, metadata, frame_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, camera_id, recorded_at, label, confidence, face_detected,
                  emotions, bbox, metadata, frame_url
        "#,
    )
    .bind(record.camera_id)
    .bind(record.recorded_at)
    .bind(record.label)
    .bind(record.confidence)
    .bind(record.face_detected)
    .bind(record.emotions)
    .bind(record.bbox)
    .bind(record.metadata)
    .bind(record.frame_url)
    .fetch_one(executor)
    .await
}

/// Read history in insertion order, optionally filtered by camera and
/// time range.
pub async fn history<'e, E>(
    executor: E,
    camera_id: Option<i64>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<EmotionRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, camera_id, recorded_at, label, confidence, face_detected,
               emotions, bbox, metadata, frame_url
        FROM emotion_records
        WHERE ($1::bigint IS NULL OR camera_id = $1)
          AND ($2::timestamptz IS NULL OR recorded_at >= $2)
          AND ($3::timestamptz IS NULL OR recorded_at <= $3)
        ORDER BY id ASC
        LIMIT $4
        "#,
    )
    .bind(camera_id)
    .bind(start)
    .bind(end)
    .bind(limit)
    .fetch_all(executor)
    .await
}
