use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchantStatus {
    Draft,
    Pending,
    Active,
    Rejected,
    Blocked,
}

impl MerchantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantStatus::Draft => "draft",
            MerchantStatus::Pending => "pending",
            MerchantStatus::Active => "active",
            MerchantStatus::Rejected => "rejected",
            MerchantStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<MerchantStatus> {
        match s {
            "draft" => Some(MerchantStatus::Draft),
            "pending" => Some(MerchantStatus::Pending),
            "active" => Some(MerchantStatus::Active),
            "rejected" => Some(MerchantStatus::Rejected),
            "blocked" => Some(MerchantStatus::Blocked),
            _ => None,
        }
    }
}

/// Onboarding is monotonic (`draft -> pending -> active`, `rejected` from
/// `pending`) except for `blocked`, reachable from any non-terminal state
/// and cleared only by explicit re-activation.
pub fn merchant_transition_allowed(from: MerchantStatus, to: MerchantStatus) -> bool {
    use MerchantStatus::*;
    matches!(
        (from, to),
        (Draft, Pending) | (Pending, Active) | (Pending, Rejected) | (Blocked, Active)
    ) || (to == Blocked && matches!(from, Draft | Pending | Active))
}

/// Statuses a transition into `to` may start from, for the repo's
/// conditional update.
pub fn merchant_transition_sources(to: MerchantStatus) -> Vec<MerchantStatus> {
    use MerchantStatus::*;
    [Draft, Pending, Active, Rejected, Blocked]
        .into_iter()
        .filter(|from| merchant_transition_allowed(*from, to))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerMerchant {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub status: MerchantStatus,
    pub external_partner_id: Option<String>,
    pub contract_id: Option<String>,
    pub payout_account_id: Option<String>,
    pub payout_account_status: Option<String>,
    /// Opaque encrypted credential bundle; decrypted only at the gateway edge.
    pub credentials_enc: Option<Vec<u8>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Only an active merchant with a confirmed payout account gets routing
/// metadata; everything else settles to the platform default.
pub fn is_routable(merchant: &PartnerMerchant) -> bool {
    merchant.status == MerchantStatus::Active
        && merchant.payout_account_id.is_some()
        && merchant.payout_account_status.as_deref() == Some("confirmed")
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerPayout {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub external_payout_id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_is_monotonic() {
        assert!(merchant_transition_allowed(MerchantStatus::Draft, MerchantStatus::Pending));
        assert!(merchant_transition_allowed(MerchantStatus::Pending, MerchantStatus::Active));
        assert!(!merchant_transition_allowed(MerchantStatus::Active, MerchantStatus::Pending));
        assert!(!merchant_transition_allowed(MerchantStatus::Active, MerchantStatus::Draft));
    }

    #[test]
    fn blocked_reachable_from_any_non_terminal() {
        for from in [MerchantStatus::Draft, MerchantStatus::Pending, MerchantStatus::Active] {
            assert!(merchant_transition_allowed(from, MerchantStatus::Blocked));
        }
        assert!(!merchant_transition_allowed(MerchantStatus::Rejected, MerchantStatus::Blocked));
    }

    #[test]
    fn blocked_clears_only_to_active() {
        assert!(merchant_transition_allowed(MerchantStatus::Blocked, MerchantStatus::Active));
        assert!(!merchant_transition_allowed(MerchantStatus::Blocked, MerchantStatus::Pending));
    }

    #[test]
    fn routing_requires_confirmed_payout_account() {
        let mut m = PartnerMerchant {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            status: MerchantStatus::Active,
            external_partner_id: Some("pm-1".to_string()),
            contract_id: Some("c-1".to_string()),
            payout_account_id: Some("acct-1".to_string()),
            payout_account_status: Some("confirmed".to_string()),
            credentials_enc: None,
            activated_at: None,
            last_synced_at: None,
            created_at: Utc::now(),
        };
        assert!(is_routable(&m));

        m.status = MerchantStatus::Blocked;
        assert!(!is_routable(&m));

        m.status = MerchantStatus::Active;
        m.payout_account_status = Some("pending".to_string());
        assert!(!is_routable(&m));
    }
}
