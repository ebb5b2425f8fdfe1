use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Payout;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePayoutRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecidePayoutRequest {
    pub approve: bool,
    pub approved_amount: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayoutList {
    pub items: Vec<Payout>,
}
