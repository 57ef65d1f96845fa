use crate::domain::transaction::TransactionStatus;
use crate::gateways::{ChargeRequest, ChargeResult, Gateway, GatewayChargeStatus, GatewayError, ParsedWebhook};
use axum::http::HeaderMap;
use uuid::Uuid;

/// Behavior-driven stand-in used by tests and local development.
pub struct MockGateway {
    pub behavior: String,
}

#[async_trait::async_trait]
impl Gateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResult, GatewayError> {
        match self.behavior.as_str() {
            "ALWAYS_REJECT" => Err(GatewayError::Rejected {
                code: "mock_declined".to_string(),
                message: "mock decline".to_string(),
            }),
            "ALWAYS_UNAVAILABLE" => Err(GatewayError::Unavailable("mock 503".to_string())),
            "IMMEDIATE_SUCCESS" => Ok(ChargeResult {
                external_id: format!("mock_{}", Uuid::new_v4()),
                status: GatewayChargeStatus::Succeeded,
                confirmation_url: None,
                qr_payload: None,
                payment_method_token: request.save_payment_method.then(|| format!("tok_{}", Uuid::new_v4())),
                raw: serde_json::json!({"mock": true}),
            }),
            _ => Ok(ChargeResult {
                external_id: format!("mock_{}", Uuid::new_v4()),
                status: GatewayChargeStatus::Pending,
                confirmation_url: Some("https://mock.gateway/redirect".to_string()),
                qr_payload: None,
                payment_method_token: None,
                raw: serde_json::json!({"mock": true}),
            }),
        }
    }

    fn parse_webhook(&self, raw: &[u8], _headers: &HeaderMap) -> Result<ParsedWebhook, GatewayError> {
        let v: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let event_type = v
            .get("event_type")
            .and_then(|e| e.as_str())
            .ok_or_else(|| GatewayError::MalformedPayload("missing event_type".to_string()))?
            .to_string();
        let object_id = v
            .get("object_id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| GatewayError::MalformedPayload("missing object_id".to_string()))?
            .to_string();

        Ok(ParsedWebhook {
            delivery_id: v.get("delivery_id").and_then(|d| d.as_str()).map(str::to_string),
            event_type,
            object_type: v
                .get("object_type")
                .and_then(|t| t.as_str())
                .unwrap_or("payment")
                .to_string(),
            object_id,
            transaction_id: v
                .get("transaction_id")
                .and_then(|id| id.as_str())
                .and_then(|id| Uuid::parse_str(id).ok()),
            target_status: v
                .get("status")
                .and_then(|s| s.as_str())
                .and_then(TransactionStatus::parse),
            payment_method_token: v
                .get("payment_method_token")
                .and_then(|t| t.as_str())
                .map(str::to_string),
            payload: v,
        })
    }

    fn verify_signature(&self, _raw: &[u8], _headers: &HeaderMap) -> bool {
        true
    }
}
