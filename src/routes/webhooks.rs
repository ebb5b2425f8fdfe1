use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    gateway::{SIGNATURE_HEADER, WebhookEvent, verify_webhook_signature},
    services::{order_service, payout_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(gateway_webhook))
}

/// Gateway callback. The signature is HMAC-SHA512 over the exact raw body;
/// unsigned or mismatched requests get a bare 401 before any parsing. The
/// gateway owns delivery retries, so handlers must tolerate replays.
#[utoipa::path(
    post,
    path = "/api/webhooks/gateway",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 401, description = "Missing or invalid signature")
    ),
    tag = "Webhooks"
)]
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, &'static str)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "missing signature"))?;

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        return Err((StatusCode::UNAUTHORIZED, "invalid signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "malformed payload"))?;

    if let Err(err) = dispatch(&state, &event).await {
        // The gateway will redeliver; our own state errors must not make it
        // retry forever.
        match err {
            AppError::NotFound => {
                tracing::warn!(event = %event.event, reference = %event.data.reference, "webhook target not found");
            }
            other => {
                tracing::error!(event = %event.event, error = %other, "webhook processing failed");
                return Err((StatusCode::INTERNAL_SERVER_ERROR, "processing failed"));
            }
        }
    }

    Ok(Json(json!({ "received": true })))
}

async fn dispatch(state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    match event.event.as_str() {
        "charge.success" | "charge.failed" => {
            let order_id = event
                .data
                .metadata
                .order_id
                .ok_or_else(|| AppError::BadRequest("charge event without order_id".into()))?;
            order_service::apply_charge_event(
                state,
                order_id,
                &event.data.reference,
                event.event == "charge.success",
            )
            .await
        }
        "transfer.success" | "transfer.failed" => {
            payout_service::apply_transfer_event(
                state,
                event.data.metadata.payout_id,
                &event.data.reference,
                event.event == "transfer.success",
            )
            .await
        }
        other => {
            tracing::debug!(event = other, "ignoring unhandled webhook event");
            Ok(())
        }
    }
}
