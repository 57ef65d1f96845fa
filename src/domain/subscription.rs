use crate::domain::transaction::RecurringPeriod;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<SubscriptionStatus> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "paused" => Some(SubscriptionStatus::Paused),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// `pending -> active -> (paused <-> active) -> cancelled`. Cancelled is
/// terminal; a cancelled agreement never resurrects.
pub fn subscription_transition_allowed(from: SubscriptionStatus, to: SubscriptionStatus) -> bool {
    use SubscriptionStatus::*;
    matches!(
        (from, to),
        (Pending, Active)
            | (Pending, Cancelled)
            | (Active, Paused)
            | (Active, Cancelled)
            | (Paused, Active)
            | (Paused, Cancelled)
    )
}

/// Statuses an explicit transition into `to` may start from. Feeds the
/// repo's conditional update so the machine above stays the single source
/// of truth.
pub fn subscription_transition_sources(to: SubscriptionStatus) -> Vec<SubscriptionStatus> {
    use SubscriptionStatus::*;
    [Pending, Active, Paused, Cancelled]
        .into_iter()
        .filter(|from| subscription_transition_allowed(*from, to))
        .collect()
}

/// Whether a scheduled run should charge this subscription now.
pub fn is_due(last_charged_at: Option<DateTime<Utc>>, period: RecurringPeriod, now: DateTime<Utc>) -> bool {
    let Some(last) = last_charged_at else {
        return true;
    };
    match period {
        RecurringPeriod::Daily => now - last >= Duration::days(1),
        RecurringPeriod::Weekly => now - last >= Duration::days(7),
        RecurringPeriod::Monthly => last
            .checked_add_months(Months::new(1))
            .map(|due| now >= due)
            .unwrap_or(true),
    }
}

/// Failure policy: a failed scheduled charge never deactivates outright;
/// the subscription is paused only once consecutive failures reach the
/// configured threshold.
pub fn status_after_failure(consecutive_failures: i32, threshold: i32) -> SubscriptionStatus {
    if consecutive_failures >= threshold {
        SubscriptionStatus::Paused
    } else {
        SubscriptionStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AutopaymentSubscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// The gateway's reusable payment-method identifier. Unique per
    /// organization; the join point with transactions.
    pub subscription_key: String,
    pub title: String,
    pub phone: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub period: RecurringPeriod,
    pub method_slug: String,
    pub status: SubscriptionStatus,
    pub consecutive_failures: i32,
    pub charges_total: i32,
    pub first_payment_at: Option<DateTime<Utc>>,
    pub last_charged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_never_reactivates() {
        assert!(!subscription_transition_allowed(
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Active
        ));
        assert!(!subscription_transition_allowed(
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Paused
        ));
    }

    #[test]
    fn pause_and_resume_cycle() {
        assert!(subscription_transition_allowed(
            SubscriptionStatus::Active,
            SubscriptionStatus::Paused
        ));
        assert!(subscription_transition_allowed(
            SubscriptionStatus::Paused,
            SubscriptionStatus::Active
        ));
    }

    #[test]
    fn never_charged_is_always_due() {
        assert!(is_due(None, RecurringPeriod::Monthly, Utc::now()));
    }

    #[test]
    fn monthly_due_uses_calendar_months() {
        let last = Utc::now() - Duration::days(27);
        assert!(!is_due(Some(last), RecurringPeriod::Monthly, Utc::now()));
        let last = Utc::now() - Duration::days(32);
        assert!(is_due(Some(last), RecurringPeriod::Monthly, Utc::now()));
    }

    #[test]
    fn pauses_exactly_at_threshold() {
        assert_eq!(status_after_failure(2, 3), SubscriptionStatus::Active);
        assert_eq!(status_after_failure(3, 3), SubscriptionStatus::Paused);
        assert_eq!(status_after_failure(5, 3), SubscriptionStatus::Paused);
    }
}
