use crate::domain::partner::{
    merchant_transition_sources, MerchantStatus, PartnerMerchant,
};
use crate::gateways::yookassa::{decimal_to_minor, minor_to_decimal};
use crate::gateways::GatewayRegistry;
use crate::repo::partner_merchants_repo::PartnerMerchantsRepo;
use crate::repo::partner_payouts_repo::PartnerPayoutsRepo;
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use crate::service::webhook_service::IntakeResponse;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Suffix distinguishing the payout event stream from transaction webhooks
/// inside the shared event ledger.
pub const PAYOUT_PROVIDER_SUFFIX: &str = "-payouts";

/// Split-settlement metadata merged into the gateway settings at charge
/// time. The transaction state machine never sees it.
pub fn routing_transfers(merchant: &PartnerMerchant, amount_minor: i64, currency: &str) -> Option<serde_json::Value> {
    let account_id = merchant.payout_account_id.as_deref()?;
    Some(serde_json::json!([{
        "account_id": account_id,
        "amount": {
            "value": minor_to_decimal(amount_minor),
            "currency": currency,
        },
    }]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutEvent {
    pub event_type: String,
    pub external_payout_id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub external_partner_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

pub fn parse_payout_event(payload: &serde_json::Value) -> Option<PayoutEvent> {
    let event_type = payload.get("event")?.as_str()?.to_string();
    let object = payload.get("object")?;
    let external_payout_id = object.get("id")?.as_str()?.to_string();
    let status = object
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_string();
    let amount_minor = object
        .pointer("/amount/value")
        .and_then(|v| v.as_str())
        .and_then(decimal_to_minor)
        .unwrap_or(0);
    let currency = object
        .pointer("/amount/currency")
        .and_then(|c| c.as_str())
        .unwrap_or("RUB")
        .to_string();
    let external_partner_id = object
        .pointer("/metadata/partner_id")
        .and_then(|id| id.as_str())
        .map(str::to_string);
    let processed_at = object
        .get("processed_at")
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    Some(PayoutEvent {
        event_type,
        external_payout_id,
        status,
        amount_minor,
        currency,
        external_partner_id,
        processed_at,
    })
}

pub fn payout_dedup_key(provider: &str, event: &PayoutEvent) -> String {
    format!(
        "{}:payout:{}:{}",
        provider, event.external_payout_id, event.event_type
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutApplyOutcome {
    Applied,
    /// No merchant matches the reported partner id yet; retried by the sweep.
    Orphan,
}

#[derive(Clone)]
pub struct PartnerService {
    pub partner_merchants_repo: PartnerMerchantsRepo,
    pub partner_payouts_repo: PartnerPayoutsRepo,
    pub webhook_events_repo: WebhookEventsRepo,
    pub registry: GatewayRegistry,
}

impl PartnerService {
    pub async fn create_draft(&self, organization_id: Uuid) -> anyhow::Result<PartnerMerchant> {
        self.partner_merchants_repo.create_draft(organization_id).await
    }

    pub async fn submit(
        &self,
        id: Uuid,
        external_partner_id: Option<&str>,
        contract_id: Option<&str>,
        payout_account_id: Option<&str>,
    ) -> anyhow::Result<bool> {
        self.partner_merchants_repo
            .update_onboarding(id, external_partner_id, contract_id, payout_account_id, None)
            .await?;
        self.transition(id, MerchantStatus::Pending).await
    }

    pub async fn approve(&self, id: Uuid, payout_account_status: Option<&str>) -> anyhow::Result<bool> {
        if payout_account_status.is_some() {
            self.partner_merchants_repo
                .update_onboarding(id, None, None, None, payout_account_status)
                .await?;
        }
        self.transition(id, MerchantStatus::Active).await
    }

    pub async fn reject(&self, id: Uuid) -> anyhow::Result<bool> {
        self.transition(id, MerchantStatus::Rejected).await
    }

    /// In-flight transactions complete against the gateway; only new charges
    /// lose their routing until re-activation.
    pub async fn block(&self, id: Uuid) -> anyhow::Result<bool> {
        self.transition(id, MerchantStatus::Blocked).await
    }

    pub async fn reactivate(&self, id: Uuid) -> anyhow::Result<bool> {
        self.transition(id, MerchantStatus::Active).await
    }

    async fn transition(&self, id: Uuid, to: MerchantStatus) -> anyhow::Result<bool> {
        let n = self
            .partner_merchants_repo
            .set_status(id, to, &merchant_transition_sources(to))
            .await?;
        Ok(n > 0)
    }

    /// Payout notifications: the same store-then-process ledger as
    /// transaction webhooks, keyed by the gateway payout id.
    pub async fn receive_payout_webhook(
        &self,
        provider: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> anyhow::Result<IntakeResponse> {
        let Some(gateway) = self.registry.by_provider(provider) else {
            return Ok(IntakeResponse::UnknownProvider);
        };
        if !gateway.verify_signature(body, headers) {
            tracing::warn!(provider, "payout webhook signature verification failed");
            return Ok(IntakeResponse::Unauthorized);
        }

        let payload: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(provider, "malformed payout webhook: {e}");
                return Ok(IntakeResponse::Stored);
            }
        };

        let ledger_provider = format!("{provider}{PAYOUT_PROVIDER_SUFFIX}");
        let Some(event) = parse_payout_event(&payload) else {
            let id = self
                .webhook_events_repo
                .insert_pending(&ledger_provider, &format!("{ledger_provider}:malformed"), "malformed", "payout", "", &payload)
                .await?;
            self.webhook_events_repo.mark_failed(id, "unrecognized payout payload").await?;
            return Ok(IntakeResponse::Stored);
        };

        let key = payout_dedup_key(provider, &event);
        let event_id = self
            .webhook_events_repo
            .insert_pending(
                &ledger_provider,
                &key,
                &event.event_type,
                "payout",
                &event.external_payout_id,
                &payload,
            )
            .await?;

        if self.webhook_events_repo.already_processed(&key, event_id).await? {
            self.webhook_events_repo.mark_processed(event_id).await?;
            return Ok(IntakeResponse::Stored);
        }

        match self.apply_payout(&event, &payload).await {
            Ok(PayoutApplyOutcome::Applied) => {
                self.webhook_events_repo.mark_processed(event_id).await?;
            }
            Ok(PayoutApplyOutcome::Orphan) => {
                tracing::info!(provider, payout_id = %event.external_payout_id, "payout event for unknown merchant, left for sweep");
            }
            Err(e) => {
                // Stays pending; the sweep retries it.
                self.webhook_events_repo.record_error(event_id, &e.to_string()).await?;
            }
        }

        Ok(IntakeResponse::Stored)
    }

    pub async fn apply_payout(
        &self,
        event: &PayoutEvent,
        payload: &serde_json::Value,
    ) -> anyhow::Result<PayoutApplyOutcome> {
        let Some(partner_id) = event.external_partner_id.as_deref() else {
            return Ok(PayoutApplyOutcome::Orphan);
        };
        let Some(merchant) = self
            .partner_merchants_repo
            .find_by_external_partner_id(partner_id)
            .await?
        else {
            return Ok(PayoutApplyOutcome::Orphan);
        };

        self.partner_payouts_repo
            .upsert_by_external_id(
                merchant.id,
                &event.external_payout_id,
                &event.status,
                event.amount_minor,
                &event.currency,
                None,
                event.processed_at,
                payload,
            )
            .await?;

        Ok(PayoutApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_payout_notification() {
        let payload = json!({
            "event": "payout.succeeded",
            "object": {
                "id": "po-77",
                "status": "succeeded",
                "amount": { "value": "250.50", "currency": "RUB" },
                "metadata": { "partner_id": "pm-3" },
                "processed_at": "2024-05-01T10:00:00Z"
            }
        });
        let event = parse_payout_event(&payload).unwrap();
        assert_eq!(event.external_payout_id, "po-77");
        assert_eq!(event.amount_minor, 25_050);
        assert_eq!(event.external_partner_id.as_deref(), Some("pm-3"));
        assert!(event.processed_at.is_some());
    }

    #[test]
    fn payout_dedup_key_is_stable_per_delivery() {
        let payload = json!({
            "event": "payout.succeeded",
            "object": { "id": "po-77", "status": "succeeded" }
        });
        let event = parse_payout_event(&payload).unwrap();
        assert_eq!(payout_dedup_key("yookassa", &event), "yookassa:payout:po-77:payout.succeeded");
    }
}
