use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ItemStatus, Order, OrderItem, OrderStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    pub items: Vec<CheckoutLine>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Present right after checkout when the gateway accepted the charge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
