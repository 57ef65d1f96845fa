use crate::domain::transaction::TransactionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Completed => "completed",
            DonationStatus::Failed => "failed",
            DonationStatus::Cancelled => "cancelled",
            DonationStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<DonationStatus> {
        match s {
            "pending" => Some(DonationStatus::Pending),
            "completed" => Some(DonationStatus::Completed),
            "failed" => Some(DonationStatus::Failed),
            "cancelled" => Some(DonationStatus::Cancelled),
            "refunded" => Some(DonationStatus::Refunded),
            _ => None,
        }
    }
}

/// The donor-facing projection is a pure function of the ledger status.
pub fn donation_status_for(status: TransactionStatus) -> DonationStatus {
    match status {
        TransactionStatus::Pending | TransactionStatus::AwaitingConfirmation => DonationStatus::Pending,
        TransactionStatus::Completed => DonationStatus::Completed,
        TransactionStatus::Failed => DonationStatus::Failed,
        TransactionStatus::Cancelled => DonationStatus::Cancelled,
        TransactionStatus::Refunded => DonationStatus::Refunded,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Donation {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub anonymous: bool,
    pub message: Option<String>,
    pub wants_receipt: bool,
    pub amount_minor: i64,
    pub currency: String,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_is_deterministic_over_all_statuses() {
        assert_eq!(donation_status_for(TransactionStatus::Pending), DonationStatus::Pending);
        assert_eq!(
            donation_status_for(TransactionStatus::AwaitingConfirmation),
            DonationStatus::Pending
        );
        assert_eq!(donation_status_for(TransactionStatus::Completed), DonationStatus::Completed);
        assert_eq!(donation_status_for(TransactionStatus::Failed), DonationStatus::Failed);
        assert_eq!(donation_status_for(TransactionStatus::Cancelled), DonationStatus::Cancelled);
        assert_eq!(donation_status_for(TransactionStatus::Refunded), DonationStatus::Refunded);
    }
}
