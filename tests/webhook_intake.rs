use axum::http::HeaderMap;
use donation_payments::domain::transaction::TransactionStatus;
use donation_payments::gateways::mock::MockGateway;
use donation_payments::gateways::yookassa::YookassaGateway;
use donation_payments::gateways::{dedup_key, ChargeRequest, Gateway, GatewayChargeStatus, GatewayError};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

fn yookassa() -> YookassaGateway {
    YookassaGateway {
        base_url: "https://api.example.test".to_string(),
        shop_id: "shop".to_string(),
        secret_key: "sk".to_string(),
        webhook_secret: "test-secret".to_string(),
        timeout_ms: 500,
        client: reqwest::Client::new(),
    }
}

fn signed_headers(body: &[u8], secret: &[u8]) -> HeaderMap {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(body);
    let sig = hex::encode(mac.finalize().into_bytes());
    let mut headers = HeaderMap::new();
    headers.insert("x-webhook-signature", sig.parse().unwrap());
    headers
}

#[test]
fn identical_deliveries_share_one_dedup_key() {
    // Scenario C hinges on this: the second delivery computes the same key
    // and short-circuits before any business logic.
    let g = yookassa();
    let body = serde_json::to_vec(&json!({
        "event": "payment.succeeded",
        "object": { "id": "ext-123" }
    }))
    .unwrap();

    let first = g.parse_webhook(&body, &HeaderMap::new()).unwrap();
    let second = g.parse_webhook(&body, &HeaderMap::new()).unwrap();
    assert_eq!(dedup_key("yookassa", &first), dedup_key("yookassa", &second));
}

#[test]
fn different_events_for_one_payment_get_distinct_keys() {
    let g = yookassa();
    let capture = serde_json::to_vec(&json!({
        "event": "payment.waiting_for_capture",
        "object": { "id": "ext-123" }
    }))
    .unwrap();
    let success = serde_json::to_vec(&json!({
        "event": "payment.succeeded",
        "object": { "id": "ext-123" }
    }))
    .unwrap();

    let a = g.parse_webhook(&capture, &HeaderMap::new()).unwrap();
    let b = g.parse_webhook(&success, &HeaderMap::new()).unwrap();
    assert_ne!(dedup_key("yookassa", &a), dedup_key("yookassa", &b));
    assert_eq!(a.target_status, Some(TransactionStatus::AwaitingConfirmation));
    assert_eq!(b.target_status, Some(TransactionStatus::Completed));
}

#[test]
fn tampered_body_fails_verification() {
    let g = yookassa();
    let body = br#"{"event":"payment.succeeded","object":{"id":"ext-1"}}"#;
    let headers = signed_headers(body, b"test-secret");
    assert!(g.verify_signature(body, &headers));

    let tampered = br#"{"event":"payment.succeeded","object":{"id":"ext-2"}}"#;
    assert!(!g.verify_signature(tampered, &headers));
}

#[test]
fn signature_from_wrong_secret_is_rejected() {
    let g = yookassa();
    let body = br#"{"event":"payment.succeeded","object":{"id":"ext-1"}}"#;
    let headers = signed_headers(body, b"other-secret");
    assert!(!g.verify_signature(body, &headers));
}

#[test]
fn unknown_event_types_carry_no_status() {
    // Informational events are stored and marked processed without touching
    // any transaction.
    let g = yookassa();
    let body = serde_json::to_vec(&json!({
        "event": "deal.closed",
        "object": { "id": "deal-9" }
    }))
    .unwrap();
    let hook = g.parse_webhook(&body, &HeaderMap::new()).unwrap();
    assert_eq!(hook.target_status, None);
}

#[test]
fn garbage_payload_is_malformed() {
    let g = yookassa();
    let err = g.parse_webhook(b"not json", &HeaderMap::new()).unwrap_err();
    assert!(matches!(err, GatewayError::MalformedPayload(_)));
}

#[tokio::test]
async fn mock_gateway_maps_behaviors_to_the_error_taxonomy() {
    let request = ChargeRequest {
        amount_minor: 10_000,
        currency: "RUB".to_string(),
        idempotency_key: Uuid::new_v4(),
        description: "test".to_string(),
        settings: serde_json::Map::new(),
        saved_method_token: None,
        save_payment_method: false,
        return_url: Some("https://donor.example/return".to_string()),
    };

    let unavailable = MockGateway { behavior: "ALWAYS_UNAVAILABLE".to_string() };
    assert!(matches!(
        unavailable.charge(&request).await.unwrap_err(),
        GatewayError::Unavailable(_)
    ));

    let rejected = MockGateway { behavior: "ALWAYS_REJECT".to_string() };
    assert!(matches!(
        rejected.charge(&request).await.unwrap_err(),
        GatewayError::Rejected { .. }
    ));

    let redirect = MockGateway { behavior: "REDIRECT".to_string() };
    let result = redirect.charge(&request).await.unwrap();
    assert_eq!(result.status, GatewayChargeStatus::Pending);
    assert!(result.confirmation_url.is_some());
}

#[tokio::test]
async fn mock_gateway_returns_a_token_only_when_asked_to_save() {
    let mut request = ChargeRequest {
        amount_minor: 5_000,
        currency: "RUB".to_string(),
        idempotency_key: Uuid::new_v4(),
        description: "test".to_string(),
        settings: serde_json::Map::new(),
        saved_method_token: None,
        save_payment_method: true,
        return_url: None,
    };

    let g = MockGateway { behavior: "IMMEDIATE_SUCCESS".to_string() };
    let with_token = g.charge(&request).await.unwrap();
    assert!(with_token.payment_method_token.is_some());

    request.save_payment_method = false;
    let without = g.charge(&request).await.unwrap();
    assert!(without.payment_method_token.is_none());
}

#[test]
fn mock_webhook_round_trips_identity_fields() {
    // Scenario B shape: an event naming an external id we never issued
    // still parses; orphan handling happens in intake, not the parser.
    let g = MockGateway { behavior: "REDIRECT".to_string() };
    let body = serde_json::to_vec(&json!({
        "delivery_id": "d-1",
        "event_type": "payment.succeeded",
        "object_id": "ext-999",
        "status": "completed"
    }))
    .unwrap();

    let hook = g.parse_webhook(&body, &HeaderMap::new()).unwrap();
    assert_eq!(hook.delivery_id.as_deref(), Some("d-1"));
    assert_eq!(hook.object_id, "ext-999");
    assert_eq!(hook.target_status, Some(TransactionStatus::Completed));
    assert_eq!(dedup_key("mock", &hook), "mock:d-1");
}
