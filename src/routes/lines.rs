use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::ErrorResponse;
use crate::services::rate_limit::{self, RateLimitError, RateLimitInfo};

/// GET /api/v1/lines/{id}/rate-limit — diagnostic view of a line's rate
/// windows and tier. Unlike the send-time gate, an unknown line is an error
/// here.
pub async fn line_rate_limit(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> Result<Json<RateLimitInfo>, (StatusCode, Json<ErrorResponse>)> {
    match rate_limit::rate_limit_info(&state.db, line_id).await {
        Ok(info) => Ok(Json(info)),
        Err(RateLimitError::LineNotFound(id)) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: format!("unknown line {id}") }),
        )),
        Err(RateLimitError::Db(e)) => {
            tracing::error!(line_id = %line_id, error = %e, "rate limit diagnostics failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: "rate limit diagnostics failed".to_string() }),
            ))
        }
    }
}
