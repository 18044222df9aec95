use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::error::SwitchboardError;

/// Converts core failures into `{success: false, message, error}` bodies.
/// Transport failures are reported in-band with a 200.
pub(crate) struct ApiError(pub SwitchboardError);

impl From<SwitchboardError> for ApiError {
    fn from(e: SwitchboardError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            SwitchboardError::NotFound { .. } => StatusCode::NOT_FOUND,
            SwitchboardError::InvalidState(_) => StatusCode::BAD_REQUEST,
            SwitchboardError::ConnectionFailure(_) | SwitchboardError::DispatchFailure(_) => {
                StatusCode::OK
            }
            SwitchboardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = serde_json::json!({
            "success": false,
            "message": self.0.to_string(),
            "error": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

pub(crate) type ApiResult = Result<Json<serde_json::Value>, ApiError>;
