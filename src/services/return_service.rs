use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::returns::{CreateReturnRequest, ReturnList},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        order_returns::{
            ActiveModel as ReturnActive, Column as ReturnCol, Entity as OrderReturns,
        },
        orders::Entity as Orders,
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    guard::{Action, authorize},
    middleware::auth::AuthUser,
    models::{PickupStatus, RefundStatus, Return, ReturnStatus, Role},
    notify,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::{refund_service, return_from_entity},
    state::AppState,
};

/// Returns may be requested this long after physical pickup.
pub const RETURN_WINDOW_HOURS: i64 = 24;

/// `now - picked_up_at <= 24h`, boundary inclusive.
pub fn within_return_window(picked_up_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - picked_up_at <= Duration::hours(RETURN_WINDOW_HOURS)
}

pub async fn request_return(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReturnRequest,
) -> AppResult<ApiResponse<Return>> {
    let order = Orders::find_by_id(payload.order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::RequestReturn { order: &order })?;

    if PickupStatus::parse(&order.pickup_status)? != PickupStatus::PickedUp {
        return Err(AppError::NotEligible);
    }
    let picked_up_at = order
        .actual_pickup_date
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            AppError::DataIntegrity(format!(
                "order {} is picked up without a pickup date",
                order.id
            ))
        })?;
    if !within_return_window(picked_up_at, Utc::now()) {
        return Err(AppError::NotEligible);
    }

    let item = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .filter(OrderItemCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.refund_amount <= 0 || payload.refund_amount > item.price * item.quantity as i64 {
        return Err(AppError::BadRequest(
            "Refund amount exceeds what was paid for this item".into(),
        ));
    }

    let ret = ReturnActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        product_id: Set(payload.product_id),
        customer_id: Set(order.customer_id),
        vendor_id: Set(item.vendor_id),
        agent_id: Set(order.agent_id),
        reason: Set(payload.reason),
        refund_amount: Set(payload.refund_amount),
        status: Set(ReturnStatus::Requested.as_str().into()),
        refund_status: Set(RefundStatus::Pending.as_str().into()),
        process_date: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    notify::notify(
        notify::RETURN_REQUESTED,
        serde_json::json!({ "return_id": ret.id, "order_id": order.id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "return_requested",
        "order_returns",
        serde_json::json!({ "return_id": ret.id, "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Return requested",
        return_from_entity(ret)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_returns(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReturnList>> {
    let (page, limit, offset) = pagination.normalize();

    let mut condition = Condition::all();
    match user.role {
        Role::Customer => condition = condition.add(ReturnCol::CustomerId.eq(user.user_id)),
        Role::Vendor => condition = condition.add(ReturnCol::VendorId.eq(user.user_id)),
        Role::Agent => condition = condition.add(ReturnCol::AgentId.eq(user.user_id)),
        Role::Admin => {}
    }

    let finder = OrderReturns::find()
        .filter(condition)
        .order_by_desc(ReturnCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(return_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Ok",
        ReturnList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn approve(
    state: &AppState,
    user: &AuthUser,
    return_id: Uuid,
) -> AppResult<ApiResponse<Return>> {
    let ret = load_undecided(state, user, return_id).await?;

    let mut active: ReturnActive = ret.into();
    active.status = Set(ReturnStatus::Approved.as_str().into());
    active.process_date = Set(Some(Utc::now().into()));
    let ret = active.update(&state.orm).await?;

    notify::notify(
        notify::RETURN_APPROVED,
        serde_json::json!({ "return_id": return_id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "return_decided",
        "order_returns",
        serde_json::json!({ "return_id": return_id, "decision": "approved" }),
    )
    .await;

    Ok(ApiResponse::success(
        "Return approved",
        return_from_entity(ret)?,
        Some(Meta::empty()),
    ))
}

pub async fn reject(
    state: &AppState,
    user: &AuthUser,
    return_id: Uuid,
    reason: String,
) -> AppResult<ApiResponse<Return>> {
    let ret = load_undecided(state, user, return_id).await?;

    let mut active: ReturnActive = ret.into();
    active.status = Set(ReturnStatus::Rejected.as_str().into());
    active.refund_status = Set(RefundStatus::Rejected.as_str().into());
    // Prefix keeps the rejection visible in the stored reason for audits.
    active.reason = Set(format!("REJECTED: {reason}"));
    active.process_date = Set(Some(Utc::now().into()));
    let ret = active.update(&state.orm).await?;

    notify::notify(
        notify::RETURN_REJECTED,
        serde_json::json!({ "return_id": return_id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "return_decided",
        "order_returns",
        serde_json::json!({ "return_id": return_id, "decision": "rejected" }),
    )
    .await;

    Ok(ApiResponse::success(
        "Return rejected",
        return_from_entity(ret)?,
        Some(Meta::empty()),
    ))
}

/// Mark the physical return settled and trigger the refund.
///
/// Completion and refund issuance are two separate commits on purpose: the
/// refund is an external side effect, so a gateway failure leaves the return
/// COMPLETED with its refund still pending for the batch job to retry.
pub async fn complete(
    state: &AppState,
    user: &AuthUser,
    return_id: Uuid,
) -> AppResult<ApiResponse<Return>> {
    let txn = state.orm.begin().await?;

    let ret = OrderReturns::find_by_id(return_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::CompleteReturn { ret: &ret })?;

    if ReturnStatus::parse(&ret.status)? != ReturnStatus::Approved {
        return Err(AppError::NotApproved);
    }

    // Restock a single unit. The original requested quantity is not read back
    // at completion time; see DESIGN.md.
    Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(1))
        .filter(ProdCol::Id.eq(ret.product_id))
        .exec(&txn)
        .await?;

    let mut active: ReturnActive = ret.into();
    active.status = Set(ReturnStatus::Completed.as_str().into());
    active.process_date = Set(Some(Utc::now().into()));
    active.update(&txn).await?;

    txn.commit().await?;

    let message = match refund_service::issue(state, return_id).await {
        Ok(_) => "Return completed; refund processed",
        Err(err) => {
            tracing::warn!(return_id = %return_id, error = %err, "refund issuance failed");
            "Return completed; refund pending retry"
        }
    };

    let ret = OrderReturns::find_by_id(return_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    notify::notify(
        notify::RETURN_COMPLETED,
        serde_json::json!({ "return_id": return_id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "return_completed",
        "order_returns",
        serde_json::json!({ "return_id": return_id }),
    )
    .await;

    Ok(ApiResponse::success(
        message,
        return_from_entity(ret)?,
        Some(Meta::empty()),
    ))
}

async fn load_undecided(
    state: &AppState,
    user: &AuthUser,
    return_id: Uuid,
) -> AppResult<crate::entity::order_returns::Model> {
    let ret = OrderReturns::find_by_id(return_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::DecideReturn { ret: &ret })?;

    if ReturnStatus::parse(&ret.status)? != ReturnStatus::Requested {
        return Err(AppError::AlreadyDecided);
    }
    Ok(ret)
}
