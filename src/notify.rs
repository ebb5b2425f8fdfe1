//! Fire-and-forget notification hook. Delivery (email, push) is owned by an
//! external worker; this side only records the event.

use serde_json::Value;

pub const RETURN_REQUESTED: &str = "RETURN_REQUESTED";
pub const RETURN_APPROVED: &str = "RETURN_APPROVED";
pub const RETURN_REJECTED: &str = "RETURN_REJECTED";
pub const RETURN_COMPLETED: &str = "RETURN_COMPLETED";
pub const PICKUP_CODE_ISSUED: &str = "PICKUP_CODE_ISSUED";
pub const ORDER_PICKED_UP: &str = "ORDER_PICKED_UP";
pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
pub const PAYMENT_COMPLETED: &str = "PAYMENT_COMPLETED";

pub fn notify(event: &str, payload: Value) {
    tracing::info!(event, payload = %payload, "notification dispatched");
}
