use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit,
    dto::returns::BatchOutcome,
    entity::{
        order_returns::{Column as ReturnCol, Entity as OrderReturns},
        orders::{Column as OrderCol, Entity as Orders},
    },
    error::{AppError, AppResult},
    gateway::RefundRequest,
    guard::{Action, authorize},
    middleware::auth::AuthUser,
    models::{PaymentStatus, RefundStatus, Return, ReturnStatus},
    response::{ApiResponse, Meta},
    services::return_from_entity,
    state::AppState,
};

/// Issue the refund for one return. Idempotent: a return whose refund is
/// already processed short-circuits without contacting the gateway.
///
/// On gateway failure the refund status is left untouched so a later batch
/// run can retry; the error surfaces to the caller.
pub async fn issue(state: &AppState, return_id: Uuid) -> AppResult<Return> {
    let ret = OrderReturns::find_by_id(return_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if RefundStatus::parse(&ret.refund_status)? == RefundStatus::Processed {
        return return_from_entity(ret);
    }

    let status = ReturnStatus::parse(&ret.status)?;
    if !matches!(status, ReturnStatus::Approved | ReturnStatus::Completed) {
        return Err(AppError::InvalidState(format!(
            "refund cannot be issued for a {status} return"
        )));
    }

    let order = Orders::find_by_id(ret.order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let reference = order
        .payment_reference
        .as_deref()
        .ok_or(AppError::NoPaymentReference)?;

    // Amounts are stored in minor units, so the gateway takes them as-is.
    // The merchant note carries the return id as the idempotency handle.
    let receipt = state
        .gateway
        .create_refund(&RefundRequest {
            transaction: reference.to_string(),
            amount: ret.refund_amount,
            customer_note: "Marketplace return refund".into(),
            merchant_note: format!("return:{return_id}"),
        })
        .await?;

    // The refund flag and the order's payment status must land together; a
    // crash between them would leave the order unreconciled.
    let txn = state.orm.begin().await?;

    OrderReturns::update_many()
        .col_expr(
            ReturnCol::RefundStatus,
            Expr::value(RefundStatus::Processed.as_str()),
        )
        .filter(ReturnCol::Id.eq(return_id))
        .exec(&txn)
        .await?;

    Orders::update_many()
        .col_expr(
            OrderCol::PaymentStatus,
            Expr::value(PaymentStatus::Refunded.as_str()),
        )
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(ret.order_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        None,
        "refund_issued",
        "order_returns",
        serde_json::json!({ "return_id": return_id, "gateway_reference": receipt.reference }),
    )
    .await;

    let ret = OrderReturns::find_by_id(return_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    return_from_entity(ret)
}

/// Issue every outstanding refund.
///
/// The sweep covers both approved returns and returns that were physically
/// completed while their gateway refund failed; those stay refund-pending
/// and must be retried here or the money never moves.
///
/// Deliberately sequential: refunds against the same order must not race each
/// other at the gateway. A per-item failure is recorded and the batch moves
/// on; the batch itself never aborts.
pub async fn issue_batch(state: &AppState) -> AppResult<BatchOutcome> {
    let pending = OrderReturns::find()
        .filter(ReturnCol::Status.is_in([
            ReturnStatus::Approved.as_str(),
            ReturnStatus::Completed.as_str(),
        ]))
        .filter(ReturnCol::RefundStatus.eq(RefundStatus::Pending.as_str()))
        .order_by_asc(ReturnCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let mut outcome = BatchOutcome {
        processed: 0,
        failed: 0,
        errors: Vec::new(),
    };

    for ret in pending {
        match issue(state, ret.id).await {
            Ok(_) => outcome.processed += 1,
            Err(err) => {
                outcome.failed += 1;
                outcome.errors.push(format!("{}: {err}", ret.id));
                tracing::warn!(return_id = %ret.id, error = %err, "batch refund item failed");
            }
        }
    }

    tracing::info!(
        processed = outcome.processed,
        failed = outcome.failed,
        "refund batch finished"
    );
    Ok(outcome)
}

pub async fn run_batch(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<BatchOutcome>> {
    authorize(user, Action::RunRefundBatch)?;
    let outcome = issue_batch(state).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "refund_batch",
        "order_returns",
        serde_json::json!({ "processed": outcome.processed, "failed": outcome.failed }),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund batch finished",
        outcome,
        Some(Meta::empty()),
    ))
}
