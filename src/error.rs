use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Order can no longer be cancelled")]
    NotCancellable,

    #[error("Order is not ready for pickup")]
    NotReady,

    #[error("Pickup code does not match")]
    CodeMismatch,

    #[error("Order has already been picked up")]
    AlreadyPickedUp,

    #[error("Return request has already been decided")]
    AlreadyDecided,

    #[error("Return has not been approved")]
    NotApproved,

    #[error("Order is outside the return window")]
    NotEligible,

    #[error("Order has no payment reference")]
    NoPaymentReference,

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidState(_)
            | AppError::NotCancellable
            | AppError::NotReady
            | AppError::CodeMismatch
            | AppError::AlreadyPickedUp
            | AppError::AlreadyDecided
            | AppError::NotApproved
            | AppError::NoPaymentReference => StatusCode::CONFLICT,
            AppError::NotEligible => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::DataIntegrity(_)
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
