use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::payouts::{CreatePayoutRequest, DecidePayoutRequest, PayoutList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Payout,
    response::ApiResponse,
    routes::params::Pagination,
    services::payout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(request_payout).get(list_payouts))
        .route("/{id}/decide", post(decide_payout))
}

#[utoipa::path(
    post,
    path = "/api/payouts",
    request_body = CreatePayoutRequest,
    responses((status = 200, body = ApiResponse<Payout>)),
    tag = "Payouts"
)]
pub async fn request_payout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePayoutRequest>,
) -> AppResult<Json<ApiResponse<Payout>>> {
    let resp = payout_service::request_payout(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payouts",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses((status = 200, body = ApiResponse<PayoutList>)),
    tag = "Payouts"
)]
pub async fn list_payouts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<PayoutList>>> {
    let resp = payout_service::list_payouts(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payouts/{id}/decide",
    request_body = DecidePayoutRequest,
    responses(
        (status = 200, body = ApiResponse<Payout>),
        (status = 409, description = "Already decided")
    ),
    tag = "Payouts"
)]
pub async fn decide_payout(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecidePayoutRequest>,
) -> AppResult<Json<ApiResponse<Payout>>> {
    let resp = payout_service::decide_payout(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
