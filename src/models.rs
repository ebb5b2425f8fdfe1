use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Result<Self, AppError> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::DataIntegrity(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(Role {
    Admin => "admin",
    Customer => "customer",
    Vendor => "vendor",
    Agent => "agent",
});

string_enum!(OrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    PartiallyFulfilled => "partially_fulfilled",
    Cancelled => "cancelled",
});

string_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

string_enum!(PickupStatus {
    AwaitingAssignment => "awaiting_assignment",
    ReadyForPickup => "ready_for_pickup",
    PickedUp => "picked_up",
});

string_enum!(ItemStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

string_enum!(ReturnStatus {
    Requested => "requested",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
});

string_enum!(RefundStatus {
    Pending => "pending",
    Processed => "processed",
    Rejected => "rejected",
    Failed => "failed",
});

string_enum!(PayoutStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Delivered | ItemStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub total_amount: i64,
    pub shipping_address: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub pickup_status: PickupStatus,
    pub actual_pickup_date: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub quantity: i32,
    pub price: i64,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Return {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub reason: String,
    pub refund_amount: i64,
    pub status: ReturnStatus,
    pub refund_status: RefundStatus,
    pub process_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Payout {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub amount: i64,
    pub status: PayoutStatus,
    pub approved_amount: Option<i64>,
    pub approved_by: Option<Uuid>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::PartiallyFulfilled,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("paid").is_err());
    }

    #[test]
    fn terminal_item_statuses() {
        assert!(ItemStatus::Delivered.is_terminal());
        assert!(ItemStatus::Cancelled.is_terminal());
        assert!(!ItemStatus::Shipped.is_terminal());
    }
}
