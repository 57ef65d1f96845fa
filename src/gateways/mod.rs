use crate::domain::method::PaymentMethodConfig;
use crate::domain::transaction::TransactionStatus;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub mod mock;
pub mod yookassa;

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    /// The transaction's public id, forwarded as the gateway idempotency key
    /// so a retried call never produces a second charge.
    pub idempotency_key: Uuid,
    pub description: String,
    /// Merged method settings plus any routing augmentation. Opaque to the
    /// core; only the gateway implementation interprets specific keys.
    pub settings: serde_json::Map<String, serde_json::Value>,
    /// Reusable credential for scheduled recurring charges. No donor
    /// interaction happens when this is set.
    pub saved_method_token: Option<String>,
    /// Ask the gateway to persist a reusable credential for autopayments.
    pub save_payment_method: bool,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayChargeStatus {
    Pending,
    Succeeded,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub external_id: String,
    pub status: GatewayChargeStatus,
    pub confirmation_url: Option<String>,
    pub qr_payload: Option<String>,
    pub payment_method_token: Option<String>,
    pub raw: serde_json::Value,
}

/// A gateway notification normalized to what intake needs: identity for
/// deduplication, a target transaction, and the status it reports.
#[derive(Debug, Clone)]
pub struct ParsedWebhook {
    pub delivery_id: Option<String>,
    pub event_type: String,
    pub object_type: String,
    pub object_id: String,
    /// Echo of our transaction public id from gateway metadata, when present.
    pub transaction_id: Option<Uuid>,
    /// None for informational events that move no money.
    pub target_status: Option<TransactionStatus>,
    pub payment_method_token: Option<String>,
    pub payload: serde_json::Value,
}

/// Natural idempotency key for a received event: the gateway-assigned
/// delivery id when one exists, else the (object_type, object_id,
/// event_type) tuple. Prefixed with the provider so two gateways can never
/// collide.
pub fn dedup_key(provider: &str, hook: &ParsedWebhook) -> String {
    match &hook.delivery_id {
        Some(id) => format!("{}:{}", provider, id),
        None => format!(
            "{}:{}:{}:{}",
            provider, hook.object_type, hook.object_id, hook.event_type
        ),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network error, timeout or 5xx. Retryable; the transaction stays
    /// pending for the webhook or a sweep to resolve.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// Business decline (4xx). Terminal.
    #[error("gateway rejected: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("no gateway registered for '{0}'")]
    UnknownMethod(String),
    #[error("webhook signature invalid")]
    SignatureInvalid,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResult, GatewayError>;

    fn parse_webhook(&self, raw: &[u8], headers: &HeaderMap) -> Result<ParsedWebhook, GatewayError>;

    fn verify_signature(&self, raw: &[u8], headers: &HeaderMap) -> bool;
}

#[derive(Clone)]
pub struct ResolvedGateway {
    pub gateway: Arc<dyn Gateway>,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// slug -> gateway instance + merged settings, resolved once per request.
/// Many method configs (card, sbp, sberpay, tpay) typically share one
/// implementation and differ only in their settings blob.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn Gateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, gateway: Arc<dyn Gateway>) {
        self.gateways.insert(name.to_string(), gateway);
    }

    /// Webhook routing discriminator: the URL path names the provider.
    pub fn by_provider(&self, provider: &str) -> Option<Arc<dyn Gateway>> {
        self.gateways.get(provider).cloned()
    }

    pub fn resolve(&self, cfg: &PaymentMethodConfig) -> Result<ResolvedGateway, GatewayError> {
        let gateway = self
            .gateways
            .get(&cfg.gateway)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownMethod(cfg.slug.clone()))?;

        let settings = match &cfg.settings {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        Ok(ResolvedGateway { gateway, settings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(delivery_id: Option<&str>) -> ParsedWebhook {
        ParsedWebhook {
            delivery_id: delivery_id.map(str::to_string),
            event_type: "payment.succeeded".to_string(),
            object_type: "payment".to_string(),
            object_id: "ext-1".to_string(),
            transaction_id: None,
            target_status: Some(TransactionStatus::Completed),
            payment_method_token: None,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn dedup_key_prefers_delivery_id() {
        assert_eq!(dedup_key("yookassa", &hook(Some("d-42"))), "yookassa:d-42");
    }

    #[test]
    fn dedup_key_falls_back_to_object_tuple() {
        assert_eq!(
            dedup_key("yookassa", &hook(None)),
            "yookassa:payment:ext-1:payment.succeeded"
        );
    }
}
