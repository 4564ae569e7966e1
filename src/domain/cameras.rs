//! Camera domain - registration and explicit online/offline transitions

use sqlx::{Executor, Postgres};

use crate::models::{CAMERA_OFFLINE, CAMERA_ONLINE, CameraRow};

pub async fn list_cameras<'e, E>(executor: E) -> Result<Vec<CameraRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, name, stream_url, status, created_at
        FROM cameras
        ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// Register a camera. New cameras start offline.
pub async fn insert_camera<'e, E>(
    executor: E,
    name: &str,
    stream_url: Option<&str>,
) -> Result<CameraRow, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO cameras (name, stream_url, status)
        VALUES ($1, $2, $3)
        RETURNING id, name, stream_url, status, created_at
        "#,
    )
    .bind(name)
    .bind(stream_url)
    .bind(CAMERA_OFFLINE)
    .fetch_one(executor)
    .await
}

/// Bring a camera online with the given stream URL. `None` for unknown ids.
pub async fn set_online<'e, E>(
    executor: E,
    camera_id: i64,
    stream_url: &str,
) -> Result<Option<CameraRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE cameras
        SET status = $2, stream_url = $3
        WHERE id = $1
        RETURNING id, name, stream_url, status, created_at
        "#,
    )
    .bind(camera_id)
    .bind(CAMERA_ONLINE)
    .bind(stream_url)
    .fetch_optional(executor)
    .await
}

/// Take a camera offline. The stored stream URL is preserved so the camera
/// can come back without re-registering.
pub async fn set_offline<'e, E>(
    executor: E,
    camera_id: i64,
) -> Result<Option<CameraRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE cameras
        SET status = $2
        WHERE id = $1
        RETURNING id, name, stream_url, status, created_at
        "#,
    )
    .bind(camera_id)
    .bind(CAMERA_OFFLINE)
    .fetch_optional(executor)
    .await
}
