use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::pickup::{IssuedCode, VerifyCodeRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    services::pickup_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{order_id}/issue", post(issue_code))
        .route("/{order_id}/verify", post(verify_code))
}

#[utoipa::path(
    post,
    path = "/api/pickup/{order_id}/issue",
    responses(
        (status = 200, body = ApiResponse<IssuedCode>),
        (status = 409, description = "Order already picked up")
    ),
    tag = "Pickup"
)]
pub async fn issue_code(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<IssuedCode>>> {
    let resp = pickup_service::issue_code(&state, &user, order_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/pickup/{order_id}/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, body = ApiResponse<Order>),
        (status = 409, description = "Wrong code, not ready, or already picked up")
    ),
    tag = "Pickup"
)]
pub async fn verify_code(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<VerifyCodeRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = pickup_service::verify_code(&state, &user, order_id, &payload.code).await?;
    Ok(Json(resp))
}
