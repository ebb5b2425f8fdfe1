use chrono::Utc;
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    audit,
    dto::pickup::IssuedCode,
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
    guard::{Action, authorize},
    middleware::auth::AuthUser,
    models::{Order, PickupStatus},
    notify,
    response::{ApiResponse, Meta},
    services::order_from_entity,
    state::AppState,
};

/// Uniform 6-digit code. Codes are scoped to a single order and single-use,
/// so collisions across orders are acceptable.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Bind a pickup code to the order and mark it ready for handoff.
///
/// Re-issuing against an order that already holds a code returns that code
/// unchanged, so drop-off agents can safely retry.
pub async fn issue_code(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<IssuedCode>> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::IssuePickupCode { order: &order })?;

    let pickup_status = PickupStatus::parse(&order.pickup_status)?;
    if let Some(existing) = order.pickup_code.clone() {
        if pickup_status == PickupStatus::ReadyForPickup {
            return Ok(ApiResponse::success(
                "Pickup code already issued",
                IssuedCode {
                    order_id,
                    pickup_code: existing,
                },
                Some(Meta::empty()),
            ));
        }
        return Err(AppError::InvalidState(format!(
            "pickup code cannot be issued while {pickup_status}"
        )));
    }
    if pickup_status == PickupStatus::PickedUp {
        return Err(AppError::InvalidState(
            "order has already been picked up".into(),
        ));
    }

    let code = generate_code();

    // Single conditional update so the code is set at most once even under a
    // concurrent duplicate issue.
    let res = Orders::update_many()
        .col_expr(OrderCol::PickupCode, Expr::value(code.clone()))
        .col_expr(
            OrderCol::PickupStatus,
            Expr::value(PickupStatus::ReadyForPickup.as_str()),
        )
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::PickupCode.is_null())
        .filter(OrderCol::PickupStatus.ne(PickupStatus::PickedUp.as_str()))
        .exec(&state.orm)
        .await?;

    let code = if res.rows_affected == 0 {
        // Lost the race; hand back whatever the winner stored.
        Orders::find_by_id(order_id)
            .one(&state.orm)
            .await?
            .and_then(|o| o.pickup_code)
            .ok_or_else(|| {
                AppError::DataIntegrity(format!("order {order_id} lost its pickup code"))
            })?
    } else {
        code
    };

    notify::notify(
        notify::PICKUP_CODE_ISSUED,
        serde_json::json!({ "order_id": order_id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "pickup_code_issued",
        "orders",
        serde_json::json!({ "order_id": order_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Pickup code issued",
        IssuedCode {
            order_id,
            pickup_code: code,
        },
        Some(Meta::empty()),
    ))
}

/// Verify the code presented at handoff and flip the order to picked up.
///
/// The flip is a compare-and-swap on `pickup_status == ready_for_pickup`; a
/// concurrent duplicate submission observes zero affected rows and fails with
/// `AlreadyPickedUp` instead of re-applying side effects.
pub async fn verify_code(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    submitted: &str,
) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::VerifyPickupCode { order: &order })?;

    match PickupStatus::parse(&order.pickup_status)? {
        PickupStatus::PickedUp => return Err(AppError::AlreadyPickedUp),
        PickupStatus::AwaitingAssignment => return Err(AppError::NotReady),
        PickupStatus::ReadyForPickup => {}
    }

    let stored = order.pickup_code.as_deref().ok_or_else(|| {
        AppError::DataIntegrity(format!("order {order_id} is ready for pickup without a code"))
    })?;
    if stored != submitted {
        return Err(AppError::CodeMismatch);
    }

    let res = Orders::update_many()
        .col_expr(
            OrderCol::PickupStatus,
            Expr::value(PickupStatus::PickedUp.as_str()),
        )
        .col_expr(
            OrderCol::ActualPickupDate,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::PickupStatus.eq(PickupStatus::ReadyForPickup.as_str()))
        .exec(&state.orm)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::AlreadyPickedUp);
    }

    let updated = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    notify::notify(
        notify::ORDER_PICKED_UP,
        serde_json::json!({ "order_id": order_id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "pickup_verified",
        "orders",
        serde_json::json!({ "order_id": order_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Pickup confirmed",
        order_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits_in_range() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }
}
