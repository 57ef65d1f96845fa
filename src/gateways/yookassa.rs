use crate::domain::transaction::TransactionStatus;
use crate::gateways::{ChargeRequest, ChargeResult, Gateway, GatewayChargeStatus, GatewayError, ParsedWebhook};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Unified gateway serving card, SBP, SberPay and T-Pay. The method configs
/// all point here and differ only in `payment_method_data.type` inside their
/// settings blob.
pub struct YookassaGateway {
    pub base_url: String,
    pub shop_id: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

pub fn minor_to_decimal(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, amount_minor % 100)
}

pub fn decimal_to_minor(value: &str) -> Option<i64> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, "0"));
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = format!("{:0<2}", frac).get(..2)?.parse().ok()?;
    Some(whole * 100 + frac)
}

fn map_payment_status(status: &str) -> GatewayChargeStatus {
    match status {
        "succeeded" => GatewayChargeStatus::Succeeded,
        "canceled" => GatewayChargeStatus::Rejected,
        _ => GatewayChargeStatus::Pending,
    }
}

impl YookassaGateway {
    fn build_body(&self, request: &ChargeRequest) -> serde_json::Value {
        let mut body = json!({
            "amount": {
                "value": minor_to_decimal(request.amount_minor),
                "currency": request.currency,
            },
            "capture": true,
            "description": request.description,
            "metadata": { "transaction_id": request.idempotency_key.to_string() },
        });

        if let Some(token) = &request.saved_method_token {
            body["payment_method_id"] = json!(token);
        } else {
            if let Some(pmd) = request.settings.get("payment_method_data") {
                body["payment_method_data"] = pmd.clone();
            }
            let confirmation_type = request
                .settings
                .get("confirmation_type")
                .and_then(|v| v.as_str())
                .unwrap_or("redirect");
            body["confirmation"] = match confirmation_type {
                "qr" => json!({ "type": "qr" }),
                _ => json!({
                    "type": "redirect",
                    "return_url": request.return_url.clone().unwrap_or_default(),
                }),
            };
            if request.save_payment_method {
                body["save_payment_method"] = json!(true);
            }
        }

        // Split-payment routing: present only for organizations with an
        // active sub-merchant (see partner_service).
        if let Some(transfers) = request.settings.get("transfers") {
            body["transfers"] = transfers.clone();
        }

        body
    }
}

#[async_trait::async_trait]
impl Gateway for YookassaGateway {
    fn name(&self) -> &'static str {
        "yookassa"
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResult, GatewayError> {
        let url = format!("{}/v3/payments", self.base_url);
        let body = self.build_body(request);

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", request.idempotency_key.to_string())
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r
                    .json()
                    .await
                    .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

                let external_id = v
                    .get("id")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| GatewayError::Unavailable("response missing payment id".to_string()))?
                    .to_string();
                let status = v
                    .get("status")
                    .and_then(|s| s.as_str())
                    .map(map_payment_status)
                    .unwrap_or(GatewayChargeStatus::Pending);
                let confirmation_url = v
                    .pointer("/confirmation/confirmation_url")
                    .and_then(|u| u.as_str())
                    .map(str::to_string);
                let qr_payload = v
                    .pointer("/confirmation/confirmation_data")
                    .and_then(|u| u.as_str())
                    .map(str::to_string);
                let payment_method_token = v
                    .pointer("/payment_method/id")
                    .and_then(|id| id.as_str())
                    .filter(|_| {
                        v.pointer("/payment_method/saved")
                            .and_then(|s| s.as_bool())
                            .unwrap_or(false)
                    })
                    .map(str::to_string);

                Ok(ChargeResult {
                    external_id,
                    status,
                    confirmation_url,
                    qr_payload,
                    payment_method_token,
                    raw: v,
                })
            }
            Ok(r) if r.status().is_server_error() => {
                let status = r.status();
                Err(GatewayError::Unavailable(format!("HTTP {}", status.as_u16())))
            }
            Ok(r) => {
                let status = r.status();
                let body = r.text().await.unwrap_or_default();
                let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
                let code = v
                    .get("code")
                    .and_then(|c| c.as_str())
                    .unwrap_or("http_error")
                    .to_string();
                let message = v
                    .get("description")
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>()));
                Err(GatewayError::Rejected { code, message })
            }
            Err(e) if e.is_timeout() => Err(GatewayError::Unavailable("gateway timeout".to_string())),
            Err(e) => Err(GatewayError::Unavailable(e.to_string())),
        }
    }

    fn parse_webhook(&self, raw: &[u8], _headers: &HeaderMap) -> Result<ParsedWebhook, GatewayError> {
        let v: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let event_type = v
            .get("event")
            .and_then(|e| e.as_str())
            .ok_or_else(|| GatewayError::MalformedPayload("missing event".to_string()))?
            .to_string();
        let object = v
            .get("object")
            .ok_or_else(|| GatewayError::MalformedPayload("missing object".to_string()))?;

        // Refund notifications carry the refund as the object; the payment
        // it refunds is referenced by payment_id.
        let (object_type, object_id) = if event_type.starts_with("refund.") {
            let payment_id = object
                .get("payment_id")
                .and_then(|id| id.as_str())
                .ok_or_else(|| GatewayError::MalformedPayload("refund missing payment_id".to_string()))?;
            ("payment".to_string(), payment_id.to_string())
        } else {
            let id = object
                .get("id")
                .and_then(|id| id.as_str())
                .ok_or_else(|| GatewayError::MalformedPayload("object missing id".to_string()))?;
            ("payment".to_string(), id.to_string())
        };

        let target_status = match event_type.as_str() {
            "payment.succeeded" => Some(TransactionStatus::Completed),
            "payment.waiting_for_capture" => Some(TransactionStatus::AwaitingConfirmation),
            "payment.canceled" => Some(TransactionStatus::Cancelled),
            "refund.succeeded" => Some(TransactionStatus::Refunded),
            _ => None,
        };

        let transaction_id = object
            .pointer("/metadata/transaction_id")
            .and_then(|id| id.as_str())
            .and_then(|id| Uuid::parse_str(id).ok());

        let payment_method_token = object
            .pointer("/payment_method/id")
            .and_then(|id| id.as_str())
            .filter(|_| {
                object
                    .pointer("/payment_method/saved")
                    .and_then(|s| s.as_bool())
                    .unwrap_or(false)
            })
            .map(str::to_string);

        Ok(ParsedWebhook {
            delivery_id: None,
            event_type,
            object_type,
            object_id,
            transaction_id,
            target_status,
            payment_method_token,
            payload: v,
        })
    }

    fn verify_signature(&self, raw: &[u8], headers: &HeaderMap) -> bool {
        if self.webhook_secret.is_empty() {
            return false;
        }
        let Some(provided) = headers
            .get("x-webhook-signature")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| hex::decode(h).ok())
        else {
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(raw);
        let expected = mac.finalize().into_bytes();

        expected.ct_eq(provided.as_slice()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_render_as_decimal_strings() {
        assert_eq!(minor_to_decimal(10_000), "100.00");
        assert_eq!(minor_to_decimal(5), "0.05");
        assert_eq!(minor_to_decimal(199), "1.99");
    }

    #[test]
    fn decimal_amounts_parse_back() {
        assert_eq!(decimal_to_minor("100.00"), Some(10_000));
        assert_eq!(decimal_to_minor("0.05"), Some(5));
        assert_eq!(decimal_to_minor("7"), Some(700));
    }

    fn gateway() -> YookassaGateway {
        YookassaGateway {
            base_url: "https://api.example.test".to_string(),
            shop_id: "shop".to_string(),
            secret_key: "sk".to_string(),
            webhook_secret: "whsec".to_string(),
            timeout_ms: 1000,
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn parses_succeeded_notification() {
        let g = gateway();
        let tx_id = Uuid::new_v4();
        let raw = serde_json::to_vec(&json!({
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "ext-123",
                "status": "succeeded",
                "metadata": { "transaction_id": tx_id.to_string() },
                "payment_method": { "id": "pm-9", "saved": true }
            }
        }))
        .unwrap();

        let hook = g.parse_webhook(&raw, &HeaderMap::new()).unwrap();
        assert_eq!(hook.event_type, "payment.succeeded");
        assert_eq!(hook.object_id, "ext-123");
        assert_eq!(hook.transaction_id, Some(tx_id));
        assert_eq!(hook.target_status, Some(TransactionStatus::Completed));
        assert_eq!(hook.payment_method_token.as_deref(), Some("pm-9"));
    }

    #[test]
    fn refund_notification_targets_the_refunded_payment() {
        let g = gateway();
        let raw = serde_json::to_vec(&json!({
            "event": "refund.succeeded",
            "object": { "id": "ref-1", "payment_id": "ext-123" }
        }))
        .unwrap();

        let hook = g.parse_webhook(&raw, &HeaderMap::new()).unwrap();
        assert_eq!(hook.object_id, "ext-123");
        assert_eq!(hook.target_status, Some(TransactionStatus::Refunded));
    }

    #[test]
    fn unsaved_payment_method_yields_no_token() {
        let g = gateway();
        let raw = serde_json::to_vec(&json!({
            "event": "payment.succeeded",
            "object": {
                "id": "ext-5",
                "payment_method": { "id": "pm-1", "saved": false }
            }
        }))
        .unwrap();

        let hook = g.parse_webhook(&raw, &HeaderMap::new()).unwrap();
        assert_eq!(hook.payment_method_token, None);
    }

    #[test]
    fn signature_accepts_only_matching_hmac() {
        let g = gateway();
        let body = br#"{"event":"payment.succeeded"}"#;

        let mut mac = HmacSha256::new_from_slice(b"whsec").unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-signature", sig.parse().unwrap());
        assert!(g.verify_signature(body, &headers));

        let mut bad = HeaderMap::new();
        bad.insert("x-webhook-signature", "00ff".parse().unwrap());
        assert!(!g.verify_signature(body, &bad));
        assert!(!g.verify_signature(body, &HeaderMap::new()));
    }
}
