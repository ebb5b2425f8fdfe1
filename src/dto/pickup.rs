use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedCode {
    pub order_id: Uuid,
    pub pickup_code: String,
}
