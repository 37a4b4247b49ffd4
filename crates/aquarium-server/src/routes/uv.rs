use aquarium_core::schedule::UvScheduleInput;
use aquarium_core::types::DeviceType;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::pagination::{PageQuery, Pagination, MAX_SCHEDULE_PAGE_SIZE, SCHEDULE_PAGE_SIZE};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ManualUvBody {
    pub duration_minutes: i64,
}

/// POST /api/v1/uv/manual: turn UV on for a fixed duration.
pub async fn manual_uv(
    State(app): State<AppState>,
    Json(body): Json<ManualUvBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let uv = app.engine.trigger_manual_uv(body.duration_minutes).await?;
    Ok(Json(serde_json::json!({
        "message": "uv turned on",
        "action_id": uv.action_id,
        "duration_minutes": uv.duration_minutes,
        "end_time": app.local(uv.end_time),
        "status": uv.status,
    })))
}

/// POST /api/v1/uv/manual/stop: turn off whatever UV session is running.
pub async fn stop_uv(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let stopped = app.engine.stop_uv().await?;
    Ok(Json(serde_json::json!({
        "message": "uv turned off",
        "action_id": stopped.action_id,
        "trigger_source": stopped.trigger_source,
        "stopped_at": app.local(stopped.stopped_at),
    })))
}

/// GET /api/v1/uv/status
pub async fn status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let view = app.engine.device_status(DeviceType::Uv).await?;
    Ok(Json(serde_json::to_value(view)?))
}

pub async fn list_schedules(
    State(app): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let paging = Pagination::from_query(&q, SCHEDULE_PAGE_SIZE, MAX_SCHEDULE_PAGE_SIZE);
    let list = app.engine.db(|s| s.schedules().list_uv()).await?;
    let total = list.len();
    Ok(Json(serde_json::json!({
        "data": paging.slice(list),
        "pagination": paging.meta(total),
    })))
}

pub async fn create_schedule(
    State(app): State<AppState>,
    Json(input): Json<UvScheduleInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let now = app.engine.now();
    let entry = app
        .engine
        .db(move |s| s.schedules().create_uv(input, now))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(entry)?)))
}

pub async fn update_schedule(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UvScheduleInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = app.engine.now();
    let entry = app
        .engine
        .db(move |s| s.schedules().update_uv(id, input, now))
        .await?;
    Ok(Json(serde_json::to_value(entry)?))
}

pub async fn delete_schedule(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.engine.db(move |s| s.schedules().delete_uv(id)).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
