use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StockBody {
    #[serde(alias = "amount_gram")]
    pub amount_grams: i64,
}

/// GET /api/v1/stock
pub async fn get_stock(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let level = app.engine.db(|s| s.stock().get()).await?;
    Ok(Json(serde_json::to_value(level)?))
}

/// PUT /api/v1/stock: overwrite the food stock.
pub async fn set_stock(
    State(app): State<AppState>,
    Json(body): Json<StockBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let amount = u64::try_from(body.amount_grams)
        .map_err(|_| AppError::bad_request("amount_grams must not be negative"))?;
    let now = app.engine.now();
    let level = app.engine.db(move |s| s.stock().set(amount, now)).await?;
    tracing::info!(amount_grams = amount, "stock updated");
    Ok(Json(serde_json::to_value(level)?))
}
