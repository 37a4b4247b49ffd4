use aquarium_core::schedule::FeederScheduleInput;
use aquarium_core::types::DeviceType;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::local_stamp;
use super::pagination::{PageQuery, Pagination, MAX_SCHEDULE_PAGE_SIZE, SCHEDULE_PAGE_SIZE};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ManualFeedBody {
    #[serde(default, alias = "amount_gram")]
    pub amount_grams: i64,
}

/// POST /api/v1/feeder/manual: feed now.
pub async fn manual_feed(
    State(app): State<AppState>,
    Json(body): Json<ManualFeedBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let feed = app.engine.trigger_manual_feed(body.amount_grams).await?;
    let last_feed = feed.last_feed.as_ref().map(|r| local_stamp(&app, r));
    Ok(Json(serde_json::json!({
        "message": "feed command sent",
        "action_id": feed.action_id,
        "amount_grams": feed.amount_grams,
        "doses": feed.doses,
        "status": feed.status,
        "last_feed": last_feed,
    })))
}

/// GET /api/v1/feeder/last-feed: most recent successful feed.
pub async fn last_feed(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let last = app
        .engine
        .db(|s| s.ledger().last_success(DeviceType::Feeder))
        .await?;
    let body = match last {
        Some(record) => {
            let mut stamp = local_stamp(&app, &record);
            stamp["exists"] = serde_json::json!(true);
            stamp["amount_grams"] = serde_json::json!(record.value);
            stamp
        }
        None => serde_json::json!({
            "exists": false,
            "message": "no feed recorded yet",
        }),
    };
    Ok(Json(body))
}

/// GET /api/v1/feeder/status
pub async fn status(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let view = app.engine.device_status(DeviceType::Feeder).await?;
    Ok(Json(serde_json::to_value(view)?))
}

/// GET /api/v1/feeder/schedules
pub async fn list_schedules(
    State(app): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let paging = Pagination::from_query(&q, SCHEDULE_PAGE_SIZE, MAX_SCHEDULE_PAGE_SIZE);
    let list = app.engine.db(|s| s.schedules().list_feeder()).await?;
    let total = list.len();
    Ok(Json(serde_json::json!({
        "data": paging.slice(list),
        "pagination": paging.meta(total),
    })))
}

/// POST /api/v1/feeder/schedules
pub async fn create_schedule(
    State(app): State<AppState>,
    Json(input): Json<FeederScheduleInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let max = app.engine.settings().max_feeder_schedules_per_day;
    let now = app.engine.now();
    let entry = app
        .engine
        .db(move |s| s.schedules().create_feeder(input, max, now))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(entry)?)))
}

/// PUT /api/v1/feeder/schedules/{id}
pub async fn update_schedule(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<FeederScheduleInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let max = app.engine.settings().max_feeder_schedules_per_day;
    let now = app.engine.now();
    let entry = app
        .engine
        .db(move |s| s.schedules().update_feeder(id, input, max, now))
        .await?;
    Ok(Json(serde_json::to_value(entry)?))
}

/// DELETE /api/v1/feeder/schedules/{id}
pub async fn delete_schedule(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.engine.db(move |s| s.schedules().delete_feeder(id)).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
