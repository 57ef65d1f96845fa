use chrono::{Duration, Utc};
use donation_payments::domain::subscription::{
    is_due, status_after_failure, subscription_transition_allowed, subscription_transition_sources,
    SubscriptionStatus,
};
use donation_payments::domain::transaction::{RecurringPeriod, Transaction, TransactionStatus};
use donation_payments::service::subscription_service::build_registration;
use uuid::Uuid;

fn completed_tx(recurring: bool) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        fundraiser_id: None,
        project_id: None,
        project_stage_id: None,
        method_config_id: None,
        method_slug: "card".to_string(),
        external_id: Some("ext-1".to_string()),
        amount_minor: 50_000,
        currency: "RUB".to_string(),
        fee_minor: 1_250,
        status: TransactionStatus::Completed,
        subscription_key: None,
        recurring,
        recurring_period: Some(RecurringPeriod::Monthly),
        payment_details: None,
        gateway_response: None,
        payment_url: None,
        qr_payload: None,
        return_url: None,
        success_url: None,
        failure_url: None,
        expires_at: None,
        paid_at: Some(Utc::now()),
        failed_at: None,
        refunded_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn registration_requires_recurring_intent() {
    // A gateway may save a credential unprompted; that alone must not
    // create an agreement.
    assert!(build_registration(&completed_tx(false), "tok-1").is_none());

    let reg = build_registration(&completed_tx(true), "tok-1").unwrap();
    assert_eq!(reg.subscription_key, "tok-1");
    assert_eq!(reg.amount_minor, 50_000);
    assert_eq!(reg.period, RecurringPeriod::Monthly);
}

#[test]
fn consecutive_failures_pause_at_the_configured_threshold() {
    // Scenario D: threshold 3, three failed periods in a row.
    let threshold = 3;
    let mut failures = 0;
    let mut status = SubscriptionStatus::Active;

    for _ in 0..3 {
        failures += 1;
        status = status_after_failure(failures, threshold);
    }
    assert_eq!(status, SubscriptionStatus::Paused);

    // The 4th scheduled run never sees the subscription: only active ones
    // are candidates.
    assert_ne!(status, SubscriptionStatus::Active);
}

#[test]
fn two_failures_do_not_pause_with_threshold_three() {
    assert_eq!(status_after_failure(1, 3), SubscriptionStatus::Active);
    assert_eq!(status_after_failure(2, 3), SubscriptionStatus::Active);
}

#[test]
fn cancelled_is_terminal() {
    for to in [
        SubscriptionStatus::Pending,
        SubscriptionStatus::Active,
        SubscriptionStatus::Paused,
    ] {
        assert!(!subscription_transition_allowed(SubscriptionStatus::Cancelled, to));
    }
    assert!(!subscription_transition_sources(SubscriptionStatus::Active)
        .contains(&SubscriptionStatus::Cancelled));
}

#[test]
fn transition_sources_feed_the_conditional_update() {
    let sources = subscription_transition_sources(SubscriptionStatus::Cancelled);
    assert!(sources.contains(&SubscriptionStatus::Pending));
    assert!(sources.contains(&SubscriptionStatus::Active));
    assert!(sources.contains(&SubscriptionStatus::Paused));
    assert!(!sources.contains(&SubscriptionStatus::Cancelled));
}

#[test]
fn daily_subscription_due_after_a_day() {
    let now = Utc::now();
    assert!(!is_due(Some(now - Duration::hours(23)), RecurringPeriod::Daily, now));
    assert!(is_due(Some(now - Duration::hours(25)), RecurringPeriod::Daily, now));
}

#[test]
fn weekly_subscription_due_after_seven_days() {
    let now = Utc::now();
    assert!(!is_due(Some(now - Duration::days(6)), RecurringPeriod::Weekly, now));
    assert!(is_due(Some(now - Duration::days(7)), RecurringPeriod::Weekly, now));
}

#[test]
fn charge_in_same_period_is_not_due_again() {
    // run_due_charges is idempotent within a period because a successful
    // charge stamps last_charged_at.
    let now = Utc::now();
    assert!(!is_due(Some(now), RecurringPeriod::Daily, now));
    assert!(!is_due(Some(now), RecurringPeriod::Monthly, now));
}
