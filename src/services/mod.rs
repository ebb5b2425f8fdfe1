use chrono::Utc;

use crate::{
    entity::{order_items, order_returns, orders, payouts},
    error::AppResult,
    models::{
        ItemStatus, Order, OrderItem, OrderStatus, PaymentStatus, Payout, PayoutStatus,
        PickupStatus, RefundStatus, Return, ReturnStatus,
    },
};

pub mod auth_service;
pub mod order_service;
pub mod payout_service;
pub mod pickup_service;
pub mod refund_service;
pub mod return_service;

// Store rows keep statuses as text; parsing them here keeps every service on
// the typed enums and turns an unknown value into a DataIntegrity error.

pub(crate) fn order_from_entity(model: orders::Model) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        customer_id: model.customer_id,
        agent_id: model.agent_id,
        total_amount: model.total_amount,
        shipping_address: model.shipping_address,
        status: OrderStatus::parse(&model.status)?,
        payment_status: PaymentStatus::parse(&model.payment_status)?,
        pickup_status: PickupStatus::parse(&model.pickup_status)?,
        actual_pickup_date: model.actual_pickup_date.map(|dt| dt.with_timezone(&Utc)),
        payment_reference: model.payment_reference,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn order_item_from_entity(model: order_items::Model) -> AppResult<OrderItem> {
    Ok(OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        vendor_id: model.vendor_id,
        quantity: model.quantity,
        price: model.price,
        status: ItemStatus::parse(&model.status)?,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

pub(crate) fn return_from_entity(model: order_returns::Model) -> AppResult<Return> {
    Ok(Return {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        customer_id: model.customer_id,
        vendor_id: model.vendor_id,
        agent_id: model.agent_id,
        reason: model.reason,
        refund_amount: model.refund_amount,
        status: ReturnStatus::parse(&model.status)?,
        refund_status: RefundStatus::parse(&model.refund_status)?,
        process_date: model.process_date.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    })
}

pub(crate) fn payout_from_entity(model: payouts::Model) -> AppResult<Payout> {
    Ok(Payout {
        id: model.id,
        vendor_id: model.vendor_id,
        amount: model.amount,
        status: PayoutStatus::parse(&model.status)?,
        approved_amount: model.approved_amount,
        approved_by: model.approved_by,
        reference: model.reference,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
