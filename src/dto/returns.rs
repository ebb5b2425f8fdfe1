use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Return;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub reason: String,
    pub refund_amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectReturnRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReturnList {
    pub items: Vec<Return>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub processed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}
