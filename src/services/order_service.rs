use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutLine, CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    gateway::{ChargeMetadata, ChargeRequest},
    guard::{Action, authorize},
    middleware::auth::AuthUser,
    models::{ItemStatus, OrderItem, OrderStatus, PaymentStatus, PickupStatus, Role},
    notify,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{order_from_entity, order_item_from_entity},
    state::AppState,
};

/// Derive the order status from the full set of its item statuses.
///
/// Only a fully-terminal item set moves the order: all delivered, all
/// cancelled, or a mix of exactly those two. Anything else leaves the order
/// untouched. Recomputed from scratch on every call so repeated runs agree.
pub fn aggregate_order_status(items: &[ItemStatus]) -> Option<OrderStatus> {
    if items.is_empty() || !items.iter().all(ItemStatus::is_terminal) {
        return None;
    }
    let delivered = items.iter().filter(|s| **s == ItemStatus::Delivered).count();
    if delivered == items.len() {
        Some(OrderStatus::Delivered)
    } else if delivered == 0 {
        Some(OrderStatus::Cancelled)
    } else {
        Some(OrderStatus::PartiallyFulfilled)
    }
}

/// Vendors walk items through the chain one step at a time, or cancel any
/// item that has not reached a terminal state.
pub fn item_transition_allowed(from: ItemStatus, to: ItemStatus) -> bool {
    use ItemStatus::*;
    match (from, to) {
        (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
        (from, Cancelled) => !from.is_terminal(),
        _ => false,
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    match user.role {
        Role::Customer => condition = condition.add(OrderCol::CustomerId.eq(user.user_id)),
        Role::Agent => condition = condition.add(OrderCol::AgentId.eq(user.user_id)),
        Role::Admin => {}
        Role::Vendor => return Err(AppError::Forbidden),
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::ViewOrder { order: &order })?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
            authorization_url: None,
        },
        Some(Meta::empty()),
    ))
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    authorize(user, Action::PlaceOrder)?;
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }

    let txn = state.orm.begin().await?;

    let customer = Users::find_by_id(user.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut total_amount: i64 = 0;
    let mut lines = Vec::with_capacity(payload.items.len());
    for CheckoutLine {
        product_id,
        quantity,
    } in &payload.items
    {
        if *quantity <= 0 {
            return Err(AppError::BadRequest("Quantity must be positive".into()));
        }
        let product = Products::find_by_id(*product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("Unknown product {product_id}")))?;
        if product.stock < *quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for product {product_id}"
            )));
        }
        total_amount += product.price * (*quantity as i64);
        lines.push((product, *quantity));
    }

    let agent_id = pick_agent(&txn).await?;

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        customer_id: Set(user.user_id),
        agent_id: Set(agent_id),
        total_amount: Set(total_amount),
        shipping_address: Set(payload.shipping_address),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_status: Set(PaymentStatus::Pending.as_str().into()),
        pickup_status: Set(PickupStatus::AwaitingAssignment.as_str().into()),
        pickup_code: Set(None),
        actual_pickup_date: Set(None),
        payment_reference: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::new();
    for (product, quantity) in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            vendor_id: Set(product.vendor_id),
            quantity: Set(*quantity),
            price: Set(product.price),
            status: Set(ItemStatus::Pending.as_str().into()),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item)?);
    }

    txn.commit().await?;

    // The charge is initialized after the order commit so a gateway outage
    // leaves a resumable pending order instead of holding a transaction open
    // across the network call.
    let charge = state
        .gateway
        .initialize_charge(&ChargeRequest {
            amount: total_amount,
            email: customer.email,
            metadata: ChargeMetadata { order_id: order.id },
        })
        .await;

    let (order, authorization_url) = match charge {
        Ok(init) => {
            let mut active: OrderActive = order.into();
            active.payment_reference = Set(Some(init.reference));
            active.updated_at = Set(Utc::now().into());
            (active.update(&state.orm).await?, init.authorization_url)
        }
        Err(err) => {
            tracing::warn!(order_id = %order.id, error = %err, "charge initialization failed");
            (order, None)
        }
    };

    audit::record(
        &state.pool,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
            authorization_url,
        },
        Some(Meta::empty()),
    ))
}

/// Stub assignment policy: the agent with the fewest non-terminal orders has
/// the most remaining capacity.
async fn pick_agent<C: ConnectionTrait>(conn: &C) -> AppResult<Option<Uuid>> {
    let agents = Users::find()
        .filter(UserCol::Role.eq(Role::Agent.as_str()))
        .all(conn)
        .await?;

    let mut best: Option<(Uuid, u64)> = None;
    for agent in agents {
        let open = Orders::find()
            .filter(OrderCol::AgentId.eq(agent.id))
            .filter(OrderCol::Status.is_in([
                OrderStatus::Pending.as_str(),
                OrderStatus::Processing.as_str(),
                OrderStatus::Shipped.as_str(),
            ]))
            .count(conn)
            .await?;
        if best.map_or(true, |(_, load)| open < load) {
            best = Some((agent.id, open));
        }
    }
    Ok(best.map(|(id, _)| id))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    authorize(user, Action::CancelOrder { order: &order })?;

    let txn = state.orm.begin().await?;

    // Conditional update: only a still-pending order can be cancelled, and a
    // concurrent transition makes this a no-op instead of a lost update.
    let res = Orders::update_many()
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Cancelled.as_str()),
        )
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&txn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotCancellable);
    }

    OrderItems::update_many()
        .col_expr(
            OrderItemCol::Status,
            Expr::value(ItemStatus::Cancelled.as_str()),
        )
        .filter(OrderItemCol::OrderId.eq(id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    notify::notify(
        notify::ORDER_CANCELLED,
        serde_json::json!({ "order_id": id }),
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_cancelled",
        "orders",
        serde_json::json!({ "order_id": id }),
    )
    .await;

    reload_order(state, id).await
}

pub async fn update_item_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    item_id: Uuid,
    new_status: ItemStatus,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let item = OrderItems::find_by_id(item_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if item.order_id != order_id {
        return Err(AppError::NotFound);
    }
    authorize(user, Action::UpdateOrderItem { item: &item })?;

    let current = ItemStatus::parse(&item.status)?;
    if !item_transition_allowed(current, new_status) {
        return Err(AppError::InvalidState(format!(
            "order item cannot move from {current} to {new_status}"
        )));
    }

    let mut active: crate::entity::order_items::ActiveModel = item.into();
    active.status = Set(new_status.as_str().into());
    active.update(&txn).await?;

    if new_status.is_terminal() {
        let statuses = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| ItemStatus::parse(&i.status))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(order_status) = aggregate_order_status(&statuses) {
            Orders::update_many()
                .col_expr(OrderCol::Status, Expr::value(order_status.as_str()))
                .col_expr(
                    OrderCol::UpdatedAt,
                    Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
                )
                .filter(OrderCol::Id.eq(order_id))
                .exec(&txn)
                .await?;
        }
    }

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "item_status_update",
        "order_items",
        serde_json::json!({ "order_id": order_id, "item_id": item_id, "status": new_status }),
    )
    .await;

    reload_order(state, order_id).await
}

/// Admin override is authoritative: it sets the order status directly and
/// cascades it onto every item, skipping the aggregation pass.
pub async fn admin_override_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    status: OrderStatus,
) -> AppResult<ApiResponse<OrderWithItems>> {
    authorize(user, Action::OverrideOrderStatus)?;

    let txn = state.orm.begin().await?;

    let res = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(status.as_str()))
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(order_id))
        .exec(&txn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    // partially_fulfilled has no item-level equivalent; the item statuses
    // already carry the split in that case.
    let cascade = match status {
        OrderStatus::Pending => Some(ItemStatus::Pending),
        OrderStatus::Processing => Some(ItemStatus::Processing),
        OrderStatus::Shipped => Some(ItemStatus::Shipped),
        OrderStatus::Delivered => Some(ItemStatus::Delivered),
        OrderStatus::Cancelled => Some(ItemStatus::Cancelled),
        OrderStatus::PartiallyFulfilled => None,
    };
    if let Some(item_status) = cascade {
        OrderItems::update_many()
            .col_expr(
                OrderItemCol::Status,
                Expr::value(item_status.as_str()),
            )
            .filter(OrderItemCol::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "admin_order_override",
        "orders",
        serde_json::json!({ "order_id": order_id, "status": status }),
    )
    .await;

    reload_order(state, order_id).await
}

/// Reconcile a gateway charge webhook into order state.
///
/// The success branch must apply its side effects exactly once even when the
/// gateway replays the event: the payment flip is a conditional update keyed
/// on the pending status, and the stock decrement only runs when that update
/// wins.
pub async fn apply_charge_event(
    state: &AppState,
    order_id: Uuid,
    reference: &str,
    success: bool,
) -> AppResult<()> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if let Some(stored) = order.payment_reference.as_deref() {
        if stored != reference {
            tracing::warn!(
                order_id = %order_id,
                stored,
                received = reference,
                "charge reference mismatch on webhook"
            );
        }
    }

    if !success {
        Orders::update_many()
            .col_expr(
                OrderCol::PaymentStatus,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .col_expr(
                OrderCol::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(OrderCol::Id.eq(order_id))
            .filter(OrderCol::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .exec(&state.orm)
            .await?;
        return Ok(());
    }

    let txn = state.orm.begin().await?;

    let res = Orders::update_many()
        .col_expr(
            OrderCol::PaymentStatus,
            Expr::value(PaymentStatus::Completed.as_str()),
        )
        .col_expr(
            OrderCol::UpdatedAt,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
        )
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
        .exec(&txn)
        .await?;

    if res.rows_affected == 0 {
        // Replay or an already-failed charge; either way the decrement must
        // not run again.
        tracing::debug!(order_id = %order_id, "charge.success webhook was a no-op");
        return Ok(());
    }

    // A freshly paid order moves into fulfillment; a cancelled one keeps its
    // status even though the payment flip above still lands.
    Orders::update_many()
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Processing.as_str()),
        )
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&txn)
        .await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(&txn)
        .await?;
    for item in &items {
        Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::col(ProdCol::Stock).sub(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    notify::notify(
        notify::PAYMENT_COMPLETED,
        serde_json::json!({ "order_id": order_id, "reference": reference }),
    );
    audit::record(
        &state.pool,
        None,
        "payment_completed",
        "orders",
        serde_json::json!({ "order_id": order_id, "reference": reference }),
    )
    .await;

    Ok(())
}

async fn reload_order(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Order updated",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
            authorization_url: None,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    #[test]
    fn aggregation_leaves_mixed_progress_alone() {
        assert_eq!(aggregate_order_status(&[Delivered, Processing]), None);
        assert_eq!(aggregate_order_status(&[Pending, Pending]), None);
        assert_eq!(aggregate_order_status(&[Cancelled, Shipped]), None);
        assert_eq!(aggregate_order_status(&[]), None);
    }

    #[test]
    fn aggregation_settles_terminal_sets() {
        assert_eq!(
            aggregate_order_status(&[Delivered, Delivered]),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(
            aggregate_order_status(&[Cancelled, Cancelled]),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(
            aggregate_order_status(&[Delivered, Cancelled]),
            Some(OrderStatus::PartiallyFulfilled)
        );
    }

    #[test]
    fn aggregation_is_idempotent() {
        let items = [Delivered, Cancelled, Delivered];
        let first = aggregate_order_status(&items);
        let second = aggregate_order_status(&items);
        assert_eq!(first, second);
        assert_eq!(first, Some(OrderStatus::PartiallyFulfilled));
    }

    #[test]
    fn item_transitions_follow_the_chain() {
        assert!(item_transition_allowed(Pending, Processing));
        assert!(item_transition_allowed(Processing, Shipped));
        assert!(item_transition_allowed(Shipped, Delivered));
        assert!(!item_transition_allowed(Pending, Shipped));
        assert!(!item_transition_allowed(Delivered, Processing));
    }

    #[test]
    fn cancel_allowed_until_terminal() {
        assert!(item_transition_allowed(Pending, Cancelled));
        assert!(item_transition_allowed(Shipped, Cancelled));
        assert!(!item_transition_allowed(Delivered, Cancelled));
        assert!(!item_transition_allowed(Cancelled, Cancelled));
    }
}
