//! Emotion endpoints (/api/emotions*, /api/model/info)

use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::AppState;
use crate::constants::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::domain::emotions::{self, NewEmotionRecord};
use crate::emotion::{EmotionRecord, IngestError, IngestOutcome};
use crate::ml;
use crate::models::EmotionRow;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/emotions", post(save_emotion).get(get_emotions))
        .route("/api/emotions/analyze", post(analyze_image))
        .route("/api/emotions/analyze/video", post(analyze_video))
        .route("/api/emotions/stream", post(analyze_stream))
        .route("/api/model/info", get(model_info))
}

#[derive(Deserialize)]
struct SaveEmotionRequest {
    label: String,
    confidence: f64,
    #[serde(rename = "box", default)]
    bbox: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    #[serde(default)]
    camera_id: Option<i64>,
}

#[derive(Serialize)]
struct EmotionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<EmotionRow>,
}

impl EmotionResponse {
    fn saved(row: EmotionRow) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(row),
        }
    }

    fn skipped(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

/// POST /api/emotions - persist a detection reported by an external
/// classifier. Low-confidence detections are skipped, not stored.
async fn save_emotion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveEmotionRequest>,
) -> Result<(StatusCode, Json<EmotionResponse>), StatusCode> {
    if !state.ml.is_reliable(req.confidence) {
        return Ok((
            StatusCode::OK,
            Json(EmotionResponse::skipped("Skipped: low confidence".to_string())),
        ));
    }

    let label = ml::format_label(&req.label);
    let row = emotions::insert_record(
        &state.db,
        NewEmotionRecord {
            camera_id: req.camera_id,
            recorded_at: Utc::now(),
            label: &label,
            confidence: req.confidence,
            face_detected: req.bbox.is_some(),
            emotions: None,
            bbox: req.bbox,
            metadata: req.metadata,
            frame_url: None,
        },
    )
    .await
    .log_500("Save emotion error")?;

    Ok((StatusCode::CREATED, Json(EmotionResponse::saved(row))))
}

#[derive(Deserialize)]
struct HistoryQuery {
    camera_id: Option<i64>,
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    count: usize,
    data: Vec<EmotionRow>,
}

/// GET /api/emotions - history in insertion order, optionally filtered by
/// camera and time range
async fn get_emotions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let start = parse_time(query.start.as_deref());
    let end = parse_time(query.end.as_deref());

    let rows = emotions::history(&state.db, query.camera_id, start, end, limit)
        .await
        .log_500("Get emotions error")?;

    Ok(Json(HistoryResponse {
        success: true,
        count: rows.len(),
        data: rows,
    }))
}

/// POST /api/emotions/analyze - classify one uploaded image
/// Multipart fields: "image" (file), "camera_id" (text)
async fn analyze_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<EmotionResponse>), StatusCode> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut camera_id: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("image") => {
                let ext = image_extension(field.content_type());
                let data = field
                    .bytes()
                    .await
                    .log_status("Image field read error", StatusCode::BAD_REQUEST)?;
                image = Some((data.to_vec(), ext.to_string()));
            }
            Some("camera_id") => {
                let text = field
                    .text()
                    .await
                    .log_status("Camera id field read error", StatusCode::BAD_REQUEST)?;
                camera_id = text.trim().parse().ok();
            }
            _ => {}
        }
    }

    let (data, ext) = image.ok_or(StatusCode::BAD_REQUEST)?;
    let camera_id = camera_id.ok_or(StatusCode::BAD_REQUEST)?;

    let frame_path = state
        .video
        .save_frame(&data, "upload", &ext)
        .await
        .log_500("Image save error")?;

    let record = state.pipeline.ingest_image(&frame_path, camera_id).await;
    let row = persist_record(&state.db, &record)
        .await
        .log_500("Persist analysis error")?;

    Ok((StatusCode::CREATED, Json(EmotionResponse::saved(row))))
}

#[derive(Serialize)]
struct VideoAnalysisResponse {
    success: bool,
    count: usize,
    data: Vec<EmotionRow>,
}

/// POST /api/emotions/analyze/video - extract frames from an uploaded
/// video and classify them in temporal order
/// Multipart fields: "video" (file), "camera_id" (text)
async fn analyze_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<VideoAnalysisResponse>), StatusCode> {
    let mut video: Option<(Vec<u8>, String)> = None;
    let mut camera_id: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("video") => {
                let filename = field
                    .file_name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "upload.mp4".to_string());
                let data = field
                    .bytes()
                    .await
                    .log_status("Video field read error", StatusCode::BAD_REQUEST)?;
                video = Some((data.to_vec(), filename));
            }
            Some("camera_id") => {
                let text = field
                    .text()
                    .await
                    .log_status("Camera id field read error", StatusCode::BAD_REQUEST)?;
                camera_id = text.trim().parse().ok();
            }
            _ => {}
        }
    }

    let (data, filename) = video.ok_or(StatusCode::BAD_REQUEST)?;
    let camera_id = camera_id.ok_or(StatusCode::BAD_REQUEST)?;

    let video_path = state
        .video
        .save_video(&data, &filename)
        .await
        .log_500("Video save error")?;

    if let Ok(meta) = state.video.metadata(&video_path).await {
        println!(
            "[emotions] Analyzing {} ({:?}s, {:?} fps)",
            video_path.display(),
            meta.duration_secs,
            meta.fps
        );
    }

    let records = state
        .pipeline
        .ingest_video(&video_path, camera_id)
        .await
        .log_500("Video analysis error")?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let row = persist_record(&state.db, record)
            .await
            .log_500("Persist analysis error")?;
        rows.push(row);
    }

    Ok((
        StatusCode::CREATED,
        Json(VideoAnalysisResponse {
            success: true,
            count: rows.len(),
            data: rows,
        }),
    ))
}

#[derive(Deserialize)]
struct StreamRequest {
    camera_id: i64,
    image: String,
}

/// POST /api/emotions/stream - ingest one base64-encoded stream frame.
/// Unreliable classifications are reported as skipped and not persisted.
async fn analyze_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StreamRequest>,
) -> Result<(StatusCode, Json<EmotionResponse>), StatusCode> {
    let outcome = state
        .pipeline
        .ingest_stream_frame(&req.image, req.camera_id)
        .await
        .map_err(|e| {
            let status = match &e {
                IngestError::InvalidImage(_) => StatusCode::BAD_REQUEST,
                IngestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            eprintln!("Stream frame error: {}", e);
            status
        })?;

    match outcome {
        IngestOutcome::Skipped { reason } => {
            Ok((StatusCode::OK, Json(EmotionResponse::skipped(reason))))
        }
        IngestOutcome::Accepted(record) => {
            let row = persist_record(&state.db, &record)
                .await
                .log_500("Persist stream frame error")?;
            Ok((StatusCode::CREATED, Json(EmotionResponse::saved(row))))
        }
    }
}

/// GET /api/model/info - model metadata proxied from the classification
/// service; null when it is unavailable
async fn model_info(State(state): State<Arc<AppState>>) -> Json<Option<serde_json::Value>> {
    Json(state.ml.model_info().await)
}

/// Hand a pipeline record to the persistence layer.
async fn persist_record(db: &PgPool, record: &EmotionRecord) -> Result<EmotionRow, sqlx::Error> {
    emotions::insert_record(
        db,
        NewEmotionRecord {
            camera_id: Some(record.camera_id),
            recorded_at: record.timestamp,
            label: &record.dominant_emotion,
            confidence: record.confidence,
            face_detected: record.face_detected,
            emotions: serde_json::to_value(&record.emotions).ok(),
            bbox: None,
            metadata: None,
            frame_url: Some(&record.frame_url),
        },
    )
    .await
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn image_extension(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_response_has_no_data() {
        let resp = EmotionResponse::skipped("Skipped: low confidence".to_string());
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Skipped: low confidence");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn time_filters_accept_rfc3339_only() {
        assert!(parse_time(Some("2026-08-07T10:00:00Z")).is_some());
        assert!(parse_time(Some("yesterday")).is_none());
        assert!(parse_time(None).is_none());
    }

    #[test]
    fn image_extension_defaults_to_jpg() {
        assert_eq!(image_extension(Some("image/png")), "png");
        assert_eq!(image_extension(Some("image/jpeg")), "jpg");
        assert_eq!(image_extension(None), "jpg");
    }
}
