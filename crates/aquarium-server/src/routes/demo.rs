use aquarium_core::demo;
use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/v1/demo/seed: insert demo schedules and stock where missing.
pub async fn seed(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let settings = app.engine.settings();
    let (dose, max) = (settings.dose_grams, settings.max_feeder_schedules_per_day);
    let now = app.engine.now();
    let report = app
        .engine
        .db(move |s| demo::seed(s, dose, max, now))
        .await?;
    Ok(Json(serde_json::json!({
        "message": "Demo data seeded",
        "seeded": report,
    })))
}

/// POST /api/v1/demo/clear: remove history and schedules, zero the stock.
pub async fn clear(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let now = app.engine.now();
    let report = app.engine.db(move |s| demo::clear(s, now)).await?;
    Ok(Json(serde_json::json!({
        "message": "Demo data cleared",
        "cleared": report,
    })))
}
