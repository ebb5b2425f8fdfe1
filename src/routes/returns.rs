use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::returns::{CreateReturnRequest, RejectReturnRequest, ReturnList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Return,
    response::ApiResponse,
    routes::params::Pagination,
    services::return_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(request_return).get(list_returns))
        .route("/{id}/approve", post(approve_return))
        .route("/{id}/reject", post(reject_return))
        .route("/{id}/complete", post(complete_return))
}

#[utoipa::path(
    post,
    path = "/api/returns",
    request_body = CreateReturnRequest,
    responses(
        (status = 200, body = ApiResponse<Return>),
        (status = 422, description = "Outside the 24h return window")
    ),
    tag = "Returns"
)]
pub async fn request_return(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReturnRequest>,
) -> AppResult<Json<ApiResponse<Return>>> {
    let resp = return_service::request_return(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/returns",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses((status = 200, body = ApiResponse<ReturnList>)),
    tag = "Returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ReturnList>>> {
    let resp = return_service::list_returns(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/returns/{id}/approve",
    responses(
        (status = 200, body = ApiResponse<Return>),
        (status = 409, description = "Already decided")
    ),
    tag = "Returns"
)]
pub async fn approve_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Return>>> {
    let resp = return_service::approve(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/returns/{id}/reject",
    request_body = RejectReturnRequest,
    responses(
        (status = 200, body = ApiResponse<Return>),
        (status = 409, description = "Already decided")
    ),
    tag = "Returns"
)]
pub async fn reject_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectReturnRequest>,
) -> AppResult<Json<ApiResponse<Return>>> {
    let resp = return_service::reject(&state, &user, id, payload.reason).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/returns/{id}/complete",
    responses(
        (status = 200, body = ApiResponse<Return>),
        (status = 409, description = "Return not approved")
    ),
    tag = "Returns"
)]
pub async fn complete_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Return>>> {
    let resp = return_service::complete(&state, &user, id).await?;
    Ok(Json(resp))
}
