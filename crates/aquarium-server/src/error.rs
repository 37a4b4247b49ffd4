use aquarium_core::AquariumError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(AquariumError::Validation(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        let Some(e) = self.0.downcast_ref::<AquariumError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            AquariumError::Conflict { .. } | AquariumError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            AquariumError::ActionNotFound(_)
            | AquariumError::ScheduleNotFound(_)
            | AquariumError::NoRunningAction(_)
            | AquariumError::StatusMissing(_) => StatusCode::NOT_FOUND,
            AquariumError::Validation(_)
            | AquariumError::MalformedScheduleEntry { .. }
            | AquariumError::TooManySchedules { .. }
            | AquariumError::ReportParse { .. } => StatusCode::BAD_REQUEST,
            AquariumError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            AquariumError::Store(_)
            | AquariumError::Join(_)
            | AquariumError::Io(_)
            | AquariumError::Yaml(_)
            | AquariumError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, "request failed: {:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
