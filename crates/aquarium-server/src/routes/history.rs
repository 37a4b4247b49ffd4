use aquarium_core::ledger::ActionFilter;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::pagination::Pagination;
use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub device_type: Option<String>,
    pub trigger_source: Option<String>,
    pub status: Option<String>,
}

impl HistoryQuery {
    fn filter(&self) -> Result<ActionFilter, AppError> {
        Ok(ActionFilter {
            device_type: self.device_type.as_deref().map(str::parse).transpose()?,
            trigger_source: self.trigger_source.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
        })
    }
}

/// GET /api/v1/history: actions, newest first.
pub async fn list_history(
    State(app): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = q.filter()?;
    let paging = Pagination::resolve(q.page, q.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let (offset, limit) = (paging.offset(), paging.page_size);

    let result = app
        .engine
        .db(move |s| s.ledger().list(&filter, offset, limit))
        .await?;
    Ok(Json(serde_json::json!({
        "data": result.records,
        "pagination": paging.meta(result.total),
    })))
}
