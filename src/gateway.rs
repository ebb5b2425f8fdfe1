//! Payment gateway client and webhook signature verification.
//!
//! All amounts cross this boundary in integer minor currency units.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Serialize)]
pub struct ChargeRequest {
    pub amount: i64,
    pub email: String,
    pub metadata: ChargeMetadata,
}

#[derive(Debug, Serialize)]
pub struct ChargeMetadata {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChargeInit {
    pub reference: String,
    pub authorization_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundRequest {
    pub transaction: String,
    pub amount: i64,
    pub customer_note: String,
    pub merchant_note: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundReceipt {
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChargeStatus {
    pub reference: String,
    pub status: String,
    pub amount: i64,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_charge(&self, req: &ChargeRequest) -> AppResult<ChargeInit>;
    async fn verify_charge(&self, reference: &str) -> AppResult<ChargeStatus>;
    async fn create_refund(&self, req: &RefundRequest) -> AppResult<RefundReceipt>;
}

/// HTTP client against the hosted gateway. One call per operation, bounded
/// timeout; retries are left to the background batch job.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            secret: secret.into(),
        })
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> AppResult<R> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("{status}: {text}")));
        }

        resp.json::<R>()
            .await
            .map_err(|e| AppError::Gateway(format!("invalid gateway response: {e}")))
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(&self, path: &str) -> AppResult<R> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.secret)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("{status}: {text}")));
        }

        resp.json::<R>()
            .await
            .map_err(|e| AppError::Gateway(format!("invalid gateway response: {e}")))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for HttpGateway {
    async fn initialize_charge(&self, req: &ChargeRequest) -> AppResult<ChargeInit> {
        self.post_json("/transaction/initialize", req).await
    }

    async fn verify_charge(&self, reference: &str) -> AppResult<ChargeStatus> {
        self.get_json(&format!("/transaction/verify/{reference}"))
            .await
    }

    async fn create_refund(&self, req: &RefundRequest) -> AppResult<RefundReceipt> {
        self.post_json("/refund", req).await
    }
}

/// Check the webhook signature header against HMAC-SHA512 over the exact raw
/// request body. Comparison is constant-time on the hex encodings.
pub fn verify_webhook_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

/// Inbound webhook payload: `{event, data: {reference, status, metadata}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: WebhookMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub payout_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"event":"charge.success"}"#;
        let sig = sign("s3cret", body);
        assert!(verify_webhook_signature("s3cret", body, &sig));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_body() {
        let body = br#"{"event":"charge.success"}"#;
        let sig = sign("s3cret", body);
        assert!(!verify_webhook_signature("other", body, &sig));
        assert!(!verify_webhook_signature(
            "s3cret",
            br#"{"event":"charge.failed"}"#,
            &sig
        ));
        assert!(!verify_webhook_signature("s3cret", body, "deadbeef"));
    }

    #[test]
    fn parses_webhook_payload() {
        let raw = r#"{
            "event": "charge.success",
            "data": {
                "reference": "ref-123",
                "status": "success",
                "metadata": {"order_id": "7f2c1e6a-58b6-4b0a-9f3e-0a3d9f6f4b11"}
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event, "charge.success");
        assert!(event.data.metadata.order_id.is_some());
        assert!(event.data.metadata.payout_id.is_none());
    }
}
