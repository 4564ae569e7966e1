//! Camera registration and online/offline endpoints (/api/camera*)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::domain::cameras;
use crate::models::CameraRow;
use crate::services::error::{LogErr, OrNotFound};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/camera", get(list_cameras).post(register_camera))
        .route("/api/camera/{id}/online", post(set_online))
        .route("/api/camera/{id}/offline", post(set_offline))
}

#[derive(Serialize)]
struct CameraListResponse {
    success: bool,
    data: Vec<CameraRow>,
}

/// GET /api/camera - list all registered cameras
async fn list_cameras(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CameraListResponse>, StatusCode> {
    let data = cameras::list_cameras(&state.db)
        .await
        .log_500("List cameras error")?;

    Ok(Json(CameraListResponse {
        success: true,
        data,
    }))
}

#[derive(Deserialize)]
struct RegisterCameraRequest {
    name: String,
    #[serde(rename = "streamUrl", default)]
    stream_url: Option<String>,
}

#[derive(Serialize)]
struct CameraResponse {
    success: bool,
    data: CameraRow,
}

/// POST /api/camera - register a new camera (starts offline)
async fn register_camera(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterCameraRequest>,
) -> Result<(StatusCode, Json<CameraResponse>), StatusCode> {
    let camera = cameras::insert_camera(&state.db, &req.name, req.stream_url.as_deref())
        .await
        .log_500("Register camera error")?;

    Ok((
        StatusCode::CREATED,
        Json(CameraResponse {
            success: true,
            data: camera,
        }),
    ))
}

#[derive(Deserialize)]
struct SetOnlineRequest {
    #[serde(rename = "streamUrl")]
    stream_url: String,
}

#[derive(Serialize)]
struct CameraToggleResponse {
    success: bool,
    status: String,
    data: CameraRow,
}

/// POST /api/camera/:id/online - bring a camera online with a stream URL
async fn set_online(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<i64>,
    Json(req): Json<SetOnlineRequest>,
) -> Result<Json<CameraToggleResponse>, StatusCode> {
    let camera = cameras::set_online(&state.db, camera_id, &req.stream_url)
        .await
        .log_500("Set camera online error")?
        .or_404()?;

    Ok(Json(CameraToggleResponse {
        success: true,
        status: camera.status.clone(),
        data: camera,
    }))
}

/// POST /api/camera/:id/offline - take a camera offline; its stream URL
/// is kept for the next time it comes up
async fn set_offline(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<i64>,
) -> Result<Json<CameraToggleResponse>, StatusCode> {
    let camera = cameras::set_offline(&state.db, camera_id)
        .await
        .log_500("Set camera offline error")?
        .or_404()?;

    Ok(Json(CameraToggleResponse {
        success: true,
        status: camera.status.clone(),
        data: camera,
    }))
}
