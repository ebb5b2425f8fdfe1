use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::returns::BatchOutcome,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::refund_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/batch", post(run_batch))
}

/// Entry point for the scheduled refund job. One failing refund never aborts
/// the batch; the outcome carries per-return errors.
#[utoipa::path(
    post,
    path = "/api/refunds/batch",
    responses(
        (status = 200, body = ApiResponse<BatchOutcome>),
        (status = 403, description = "Admin only")
    ),
    tag = "Refunds"
)]
pub async fn run_batch(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<BatchOutcome>>> {
    let resp = refund_service::run_batch(&state, &user).await?;
    Ok(Json(resp))
}
