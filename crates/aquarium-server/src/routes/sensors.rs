use axum::extract::{Query, State};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;

use super::pagination::Pagination;
use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct SensorHistoryQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    /// `24h`, `7d` or `30d`. Anything else means all readings.
    pub period: Option<String>,
}

fn period_length(period: Option<&str>) -> Option<Duration> {
    match period? {
        "24h" => Some(Duration::hours(24)),
        "7d" => Some(Duration::days(7)),
        "30d" => Some(Duration::days(30)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct InjectBody {
    pub temperature: f64,
    pub humidity: f64,
}

/// GET /api/v1/sensors/current: latest reading.
pub async fn current(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let latest = app.engine.db(|s| s.sensors().latest()).await?;
    let body = match latest {
        Some(r) => serde_json::json!({
            "exists": true,
            "temperature": r.temperature,
            "humidity": r.humidity,
            "last_updated": r.recorded_at,
        }),
        None => serde_json::json!({
            "exists": false,
            "message": "no sensor data yet",
        }),
    };
    Ok(Json(body))
}

/// GET /api/v1/sensors/history: readings, newest first.
pub async fn history(
    State(app): State<AppState>,
    Query(q): Query<SensorHistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let paging = Pagination::resolve(q.page, q.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let (offset, limit) = (paging.offset(), paging.page_size);
    let since = period_length(q.period.as_deref()).map(|len| app.engine.now() - len);

    let result = app
        .engine
        .db(move |s| s.sensors().list(since, offset, limit))
        .await?;
    Ok(Json(serde_json::json!({
        "data": result.records,
        "pagination": paging.meta(result.total),
    })))
}

/// POST /api/v1/sensors/inject: store a reading by hand.
pub async fn inject(
    State(app): State<AppState>,
    Json(body): Json<InjectBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = app.engine.now();
    let reading = app
        .engine
        .db(move |s| s.sensors().record(body.temperature, body.humidity, now))
        .await?;
    Ok(Json(serde_json::json!({
        "message": "sensor reading recorded",
        "id": reading.id,
        "temperature": reading.temperature,
        "humidity": reading.humidity,
        "recorded_at": reading.recorded_at,
    })))
}
