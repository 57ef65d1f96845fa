use chrono::Utc;
use donation_payments::domain::partner::{
    is_routable, merchant_transition_allowed, merchant_transition_sources, MerchantStatus,
    PartnerMerchant,
};
use donation_payments::service::partner_service::{
    parse_payout_event, payout_dedup_key, routing_transfers,
};
use serde_json::json;
use uuid::Uuid;

fn merchant(status: MerchantStatus) -> PartnerMerchant {
    PartnerMerchant {
        id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        status,
        external_partner_id: Some("pm-1".to_string()),
        contract_id: Some("contract-1".to_string()),
        payout_account_id: Some("acct-42".to_string()),
        payout_account_status: Some("confirmed".to_string()),
        credentials_enc: None,
        activated_at: Some(Utc::now()),
        last_synced_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn active_merchant_gets_split_routing_metadata() {
    let m = merchant(MerchantStatus::Active);
    assert!(is_routable(&m));

    let transfers = routing_transfers(&m, 10_000, "RUB").unwrap();
    let first = &transfers[0];
    assert_eq!(first["account_id"], "acct-42");
    assert_eq!(first["amount"]["value"], "100.00");
    assert_eq!(first["amount"]["currency"], "RUB");
}

#[test]
fn blocked_merchant_falls_back_to_platform_settlement() {
    // Scenario E: blocked merchant, new charges carry no routing metadata.
    let m = merchant(MerchantStatus::Blocked);
    assert!(!is_routable(&m));
}

#[test]
fn merchant_without_payout_account_is_not_routable() {
    let mut m = merchant(MerchantStatus::Active);
    m.payout_account_id = None;
    assert!(!is_routable(&m));
    assert_eq!(routing_transfers(&m, 10_000, "RUB"), None);
}

#[test]
fn onboarding_happy_path() {
    assert!(merchant_transition_allowed(MerchantStatus::Draft, MerchantStatus::Pending));
    assert!(merchant_transition_allowed(MerchantStatus::Pending, MerchantStatus::Active));
}

#[test]
fn rejected_is_terminal_and_blocked_recovers_only_to_active() {
    for to in [
        MerchantStatus::Draft,
        MerchantStatus::Pending,
        MerchantStatus::Active,
        MerchantStatus::Blocked,
    ] {
        assert!(!merchant_transition_allowed(MerchantStatus::Rejected, to));
    }

    assert_eq!(
        merchant_transition_sources(MerchantStatus::Active),
        vec![MerchantStatus::Pending, MerchantStatus::Blocked]
    );
}

#[test]
fn blocked_is_reachable_from_every_non_terminal_state() {
    assert_eq!(
        merchant_transition_sources(MerchantStatus::Blocked),
        vec![MerchantStatus::Draft, MerchantStatus::Pending, MerchantStatus::Active]
    );
}

#[test]
fn payout_events_are_idempotently_keyed() {
    let payload = json!({
        "event": "payout.succeeded",
        "object": {
            "id": "po-9",
            "status": "succeeded",
            "amount": { "value": "1500.00", "currency": "RUB" },
            "metadata": { "partner_id": "pm-1" }
        }
    });

    let a = parse_payout_event(&payload).unwrap();
    let b = parse_payout_event(&payload).unwrap();
    assert_eq!(payout_dedup_key("yookassa", &a), payout_dedup_key("yookassa", &b));
    assert_eq!(a.amount_minor, 150_000);
}

#[test]
fn payout_without_partner_reference_is_an_orphan_candidate() {
    let payload = json!({
        "event": "payout.succeeded",
        "object": { "id": "po-10", "status": "succeeded" }
    });
    let event = parse_payout_event(&payload).unwrap();
    assert_eq!(event.external_partner_id, None);
}
