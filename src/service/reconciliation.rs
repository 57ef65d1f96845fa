use crate::gateways::GatewayRegistry;
use crate::repo::webhook_events_repo::{StoredWebhookEvent, WebhookEventsRepo};
use crate::service::partner_service::{
    parse_payout_event, PartnerService, PayoutApplyOutcome, PAYOUT_PROVIDER_SUFFIX,
};
use crate::service::webhook_service::{ApplyOutcome, WebhookService};
use anyhow::Result;
use axum::http::HeaderMap;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct SweepStats {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

/// Replays webhook events that never reached a terminal processing status:
/// orphans that arrived before their transaction committed, and leftovers
/// from a crash between the durability insert and the business effect.
#[derive(Clone)]
pub struct ReconciliationSweep {
    pub webhook_events_repo: WebhookEventsRepo,
    pub webhook_service: WebhookService,
    pub partner_service: PartnerService,
    pub registry: GatewayRegistry,
    pub orphan_retry_minutes: i64,
    pub max_attempts: i32,
}

impl ReconciliationSweep {
    pub async fn run(self, interval_secs: u64) {
        loop {
            match self.replay_unprocessed(100).await {
                Ok(stats) if stats.scanned > 0 => {
                    tracing::info!(
                        scanned = stats.scanned,
                        processed = stats.processed,
                        failed = stats.failed,
                        still_pending = stats.still_pending,
                        "webhook replay sweep"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::error!("webhook replay sweep error: {err:#}"),
            }

            match self.expire_stale_charges(100).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(cancelled = n, "expired pending charges"),
                Err(err) => tracing::error!("charge expiry sweep error: {err:#}"),
            }

            tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
        }
    }

    /// Cancels pending charges whose confirmation window lapsed. Runs
    /// through the conditional transition, so a webhook racing the expiry
    /// loses cleanly on one side or the other.
    pub async fn expire_stale_charges(&self, limit: i64) -> Result<u64> {
        use crate::domain::donation::donation_status_for;
        use crate::domain::transaction::TransactionStatus;

        let ids = self
            .webhook_service
            .transactions_repo
            .list_expired_pending(limit)
            .await?;

        let mut cancelled = 0;
        for id in ids {
            let applied = self
                .webhook_service
                .transactions_repo
                .apply_status(id, TransactionStatus::Cancelled)
                .await?;
            if applied == 0 {
                continue;
            }
            cancelled += 1;
            self.webhook_service
                .donations_repo
                .sync_status(id, donation_status_for(TransactionStatus::Cancelled))
                .await?;
            self.webhook_service
                .event_log_repo
                .append(
                    id,
                    "expired",
                    "info",
                    "pending charge expired without confirmation",
                    serde_json::Value::Null,
                    None,
                    None,
                )
                .await?;
        }

        Ok(cancelled)
    }

    pub async fn replay_unprocessed(&self, limit: i64) -> Result<SweepStats> {
        let events = self
            .webhook_events_repo
            .pending_older_than(self.orphan_retry_minutes, limit)
            .await?;

        let mut stats = SweepStats {
            scanned: events.len(),
            ..Default::default()
        };

        for event in events {
            let attempts = self.webhook_events_repo.bump_attempts(event.id).await?;
            match self.replay_one(&event).await {
                Ok(true) => stats.processed += 1,
                Ok(false) => {
                    if attempts >= self.max_attempts {
                        self.webhook_events_repo
                            .mark_failed(event.id, "orphaned: target never arrived")
                            .await?;
                        stats.failed += 1;
                    } else {
                        stats.still_pending += 1;
                    }
                }
                Err(e) => {
                    if attempts >= self.max_attempts {
                        self.webhook_events_repo.mark_failed(event.id, &e.to_string()).await?;
                        stats.failed += 1;
                    } else {
                        self.webhook_events_repo.record_error(event.id, &e.to_string()).await?;
                        stats.still_pending += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Ok(true): reached a terminal processing status. Ok(false): still an
    /// orphan, stays pending.
    async fn replay_one(&self, event: &StoredWebhookEvent) -> Result<bool> {
        if event.provider.ends_with(PAYOUT_PROVIDER_SUFFIX) {
            let parsed = parse_payout_event(&event.payload)
                .ok_or_else(|| anyhow::anyhow!("stored payout event no longer parses"))?;
            return match self.partner_service.apply_payout(&parsed, &event.payload).await? {
                PayoutApplyOutcome::Applied => {
                    self.webhook_events_repo.mark_processed(event.id).await?;
                    Ok(true)
                }
                PayoutApplyOutcome::Orphan => Ok(false),
            };
        }

        let gateway = self
            .registry
            .by_provider(&event.provider)
            .ok_or_else(|| anyhow::anyhow!("provider '{}' no longer registered", event.provider))?;

        // Signature was verified at receipt; replay works from the stored
        // payload alone.
        let raw = serde_json::to_vec(&event.payload)?;
        let hook = gateway
            .parse_webhook(&raw, &HeaderMap::new())
            .map_err(|e| anyhow::anyhow!("stored event no longer parses: {e}"))?;

        match self.webhook_service.apply(&hook).await? {
            ApplyOutcome::Orphan => Ok(false),
            _ => {
                self.webhook_events_repo.mark_processed(event.id).await?;
                Ok(true)
            }
        }
    }
}
