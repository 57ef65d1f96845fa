use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    AwaitingConfirmation,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::AwaitingConfirmation => "awaiting_confirmation",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionStatus> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "awaiting_confirmation" => Some(TransactionStatus::AwaitingConfirmation),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            "refunded" => Some(TransactionStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
                | TransactionStatus::Refunded
        )
    }
}

/// Statuses a row may currently hold for a transition into `target` to be
/// legal. Used verbatim as the `status = ANY(...)` predicate of the
/// conditional update, so racing writers resolve at the database.
pub fn allowed_predecessors(target: TransactionStatus) -> &'static [TransactionStatus] {
    match target {
        TransactionStatus::Pending => &[],
        TransactionStatus::AwaitingConfirmation => &[TransactionStatus::Pending],
        TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled => &[
            TransactionStatus::Pending,
            TransactionStatus::AwaitingConfirmation,
        ],
        TransactionStatus::Refunded => &[TransactionStatus::Completed],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Legal transition, run the conditional update.
    Apply,
    /// Row already holds the target status. Benign no-op.
    AlreadyApplied,
    /// Terminal regression or otherwise unreachable target. Logged as an
    /// anomaly, never written.
    Conflict,
}

pub fn classify_transition(current: TransactionStatus, target: TransactionStatus) -> TransitionOutcome {
    if current == target {
        return TransitionOutcome::AlreadyApplied;
    }
    if allowed_predecessors(target).contains(&current) {
        return TransitionOutcome::Apply;
    }
    TransitionOutcome::Conflict
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl RecurringPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringPeriod::Daily => "daily",
            RecurringPeriod::Weekly => "weekly",
            RecurringPeriod::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<RecurringPeriod> {
        match s {
            "daily" => Some(RecurringPeriod::Daily),
            "weekly" => Some(RecurringPeriod::Weekly),
            "monthly" => Some(RecurringPeriod::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonorInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub wants_receipt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChargeRequest {
    pub organization_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub method_slug: String,
    pub fundraiser_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub project_stage_id: Option<Uuid>,
    pub donor: DonorInfo,
    #[serde(default)]
    pub recurring: bool,
    pub recurring_period: Option<RecurringPeriod>,
    pub return_url: Option<String>,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateChargeResponse {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub payment_url: Option<String>,
    pub qr_payload: Option<String>,
}

/// Full ledger row. Money-affecting fields are frozen once the status is
/// terminal; only the repo's conditional updates may move `status`.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub fundraiser_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub project_stage_id: Option<Uuid>,
    pub method_config_id: Option<Uuid>,
    pub method_slug: String,
    pub external_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub fee_minor: i64,
    pub status: TransactionStatus,
    pub subscription_key: Option<String>,
    pub recurring: bool,
    pub recurring_period: Option<RecurringPeriod>,
    pub payment_details: Option<serde_json::Value>,
    pub gateway_response: Option<serde_json::Value>,
    pub payment_url: Option<String>,
    pub qr_payload: Option<String>,
    pub return_url: Option<String>,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

pub fn err(code: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope {
        error: ErrorPayload {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_is_reachable_from_pending_and_awaiting() {
        assert_eq!(
            classify_transition(TransactionStatus::Pending, TransactionStatus::Completed),
            TransitionOutcome::Apply
        );
        assert_eq!(
            classify_transition(TransactionStatus::AwaitingConfirmation, TransactionStatus::Completed),
            TransitionOutcome::Apply
        );
    }

    #[test]
    fn terminal_states_never_regress() {
        assert_eq!(
            classify_transition(TransactionStatus::Completed, TransactionStatus::Failed),
            TransitionOutcome::Conflict
        );
        assert_eq!(
            classify_transition(TransactionStatus::Failed, TransactionStatus::Completed),
            TransitionOutcome::Conflict
        );
        assert_eq!(
            classify_transition(TransactionStatus::Refunded, TransactionStatus::Completed),
            TransitionOutcome::Conflict
        );
    }

    #[test]
    fn refund_only_from_completed() {
        assert_eq!(
            classify_transition(TransactionStatus::Completed, TransactionStatus::Refunded),
            TransitionOutcome::Apply
        );
        assert_eq!(
            classify_transition(TransactionStatus::Pending, TransactionStatus::Refunded),
            TransitionOutcome::Conflict
        );
    }

    #[test]
    fn duplicate_delivery_is_a_noop() {
        assert_eq!(
            classify_transition(TransactionStatus::Completed, TransactionStatus::Completed),
            TransitionOutcome::AlreadyApplied
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            TransactionStatus::Pending,
            TransactionStatus::AwaitingConfirmation,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
            TransactionStatus::Refunded,
        ] {
            assert_eq!(TransactionStatus::parse(s.as_str()), Some(s));
        }
    }
}
