pub mod cameras;
pub mod emotions;
pub mod media;

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(emotions::routes())
        .merge(cameras::routes())
        .merge(media::routes())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    ml_service: bool,
    timestamp: DateTime<Utc>,
}

/// GET /health - liveness plus a probe of the classification service
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Emotion Recognition API is running",
        ml_service: state.ml.health_check().await,
        timestamp: Utc::now(),
    })
}
