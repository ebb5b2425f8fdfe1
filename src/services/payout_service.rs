use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::payouts::{CreatePayoutRequest, DecidePayoutRequest, PayoutList},
    entity::payouts::{ActiveModel as PayoutActive, Column as PayoutCol, Entity as Payouts},
    error::{AppError, AppResult},
    guard::{Action, authorize},
    middleware::auth::AuthUser,
    models::{Payout, PayoutStatus, Role},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::payout_from_entity,
    state::AppState,
};

pub async fn request_payout(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePayoutRequest,
) -> AppResult<ApiResponse<Payout>> {
    authorize(user, Action::RequestPayout)?;
    if payload.amount <= 0 {
        return Err(AppError::BadRequest("Payout amount must be positive".into()));
    }

    let payout = PayoutActive {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(user.user_id),
        amount: Set(payload.amount),
        status: Set(PayoutStatus::Pending.as_str().into()),
        approved_amount: Set(None),
        approved_by: Set(None),
        reference: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "payout_requested",
        "payouts",
        serde_json::json!({ "payout_id": payout.id, "amount": payout.amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payout requested",
        payout_from_entity(payout)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_payouts(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<PayoutList>> {
    let (page, limit, offset) = pagination.normalize();

    let mut condition = Condition::all();
    match user.role {
        Role::Vendor => condition = condition.add(PayoutCol::VendorId.eq(user.user_id)),
        Role::Admin => {}
        _ => return Err(AppError::Forbidden),
    }

    let finder = Payouts::find()
        .filter(condition)
        .order_by_desc(PayoutCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payout_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Ok",
        PayoutList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn decide_payout(
    state: &AppState,
    user: &AuthUser,
    payout_id: Uuid,
    payload: DecidePayoutRequest,
) -> AppResult<ApiResponse<Payout>> {
    authorize(user, Action::DecidePayout)?;

    let payout = Payouts::find_by_id(payout_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if PayoutStatus::parse(&payout.status)? != PayoutStatus::Pending {
        return Err(AppError::AlreadyDecided);
    }

    let decided = if payload.approve {
        PayoutStatus::Completed
    } else {
        PayoutStatus::Failed
    };
    let approved_amount = payload.approved_amount.unwrap_or(payout.amount);

    let mut active: PayoutActive = payout.into();
    active.status = Set(decided.as_str().into());
    active.approved_amount = Set(Some(approved_amount));
    active.approved_by = Set(Some(user.user_id));
    let payout = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "payout_decided",
        "payouts",
        serde_json::json!({ "payout_id": payout.id, "status": decided }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payout decided",
        payout_from_entity(payout)?,
        Some(Meta::empty()),
    ))
}

/// Settle a payout from a gateway transfer webhook. Keyed on the stored
/// reference and the pending status, so replays are no-ops.
pub async fn apply_transfer_event(
    state: &AppState,
    payout_id: Option<Uuid>,
    reference: &str,
    success: bool,
) -> AppResult<()> {
    let status = if success {
        PayoutStatus::Completed
    } else {
        PayoutStatus::Failed
    };

    let mut condition = Condition::all()
        .add(PayoutCol::Status.eq(PayoutStatus::Pending.as_str()));
    condition = match payout_id {
        Some(id) => condition.add(PayoutCol::Id.eq(id)),
        None => condition.add(PayoutCol::Reference.eq(reference)),
    };

    let res = Payouts::update_many()
        .col_expr(PayoutCol::Status, Expr::value(status.as_str()))
        .col_expr(PayoutCol::Reference, Expr::value(reference))
        .filter(condition)
        .exec(&state.orm)
        .await?;
    if res.rows_affected == 0 {
        tracing::debug!(reference, "transfer webhook was a no-op");
    }
    Ok(())
}
