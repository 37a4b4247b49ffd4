use aquarium_core::types::DeviceType;
use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/v1/dashboard: stock, both device states and the latest reading.
pub async fn get_dashboard(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stock = app.engine.db(|s| s.stock().get()).await?;
    let uv = app.engine.device_status(DeviceType::Uv).await?;
    let feeder = app.engine.device_status(DeviceType::Feeder).await?;
    let environment = app.engine.db(|s| s.sensors().latest()).await?.map(|r| {
        serde_json::json!({
            "temperature": r.temperature,
            "humidity": r.humidity,
            "last_updated": r.recorded_at,
        })
    });
    Ok(Json(serde_json::json!({
        "stock": { "amount_grams": stock.amount_grams, "updated_at": stock.updated_at },
        "uv": {
            "state": uv.status,
            "remaining": uv.remaining_seconds,
            "last_updated": uv.last_updated,
            "manual_active": uv.manual_active,
            "manual_end_time": uv.manual_end_time,
        },
        "feeder": {
            "status": feeder.status,
            "last_updated": feeder.last_updated,
        },
        "environment": environment,
    })))
}
