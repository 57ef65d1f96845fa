use crate::domain::donation::donation_status_for;
use crate::domain::transaction::{classify_transition, Transaction, TransactionStatus, TransitionOutcome};
use crate::gateways::{dedup_key, GatewayRegistry, ParsedWebhook};
use crate::repo::donations_repo::DonationsRepo;
use crate::repo::event_log_repo::EventLogRepo;
use crate::repo::subscriptions_repo::SubscriptionsRepo;
use crate::repo::transactions_repo::TransactionsRepo;
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use crate::service::subscription_service::build_registration;
use axum::http::HeaderMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// What the HTTP layer should answer. Everything durably stored gets a 200
/// regardless of processing outcome, so the gateway keeps its delivery
/// contract and never stops retrying for our internal reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeResponse {
    Stored,
    Unauthorized,
    UnknownProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied,
    Conflict,
    /// Transaction not found. Gateways may deliver before our synchronous
    /// path commits; the event stays pending for the sweep.
    Orphan,
    /// Event moves no money (informational type).
    Informational,
}

#[derive(Clone)]
pub struct WebhookService {
    pub registry: GatewayRegistry,
    pub transactions_repo: TransactionsRepo,
    pub donations_repo: DonationsRepo,
    pub event_log_repo: EventLogRepo,
    pub webhook_events_repo: WebhookEventsRepo,
    pub subscriptions_repo: SubscriptionsRepo,
}

impl WebhookService {
    pub async fn receive(
        &self,
        provider: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> anyhow::Result<IntakeResponse> {
        let Some(gateway) = self.registry.by_provider(provider) else {
            return Ok(IntakeResponse::UnknownProvider);
        };

        // Rejecting before persistence keeps unauthenticated traffic from
        // amplifying writes.
        if !gateway.verify_signature(body, headers) {
            tracing::warn!(provider, "webhook signature verification failed");
            return Ok(IntakeResponse::Unauthorized);
        }

        let hook = match gateway.parse_webhook(body, headers) {
            Ok(hook) => hook,
            Err(e) => {
                // Authentic but unparseable: store it for forensics, answer
                // 200 so the gateway does not retry a payload we will never
                // understand.
                let key = format!("{}:malformed:{}", provider, hash_bytes(body));
                let raw: serde_json::Value =
                    serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
                let id = self
                    .webhook_events_repo
                    .insert_pending(provider, &key, "malformed", "unknown", "", &raw)
                    .await?;
                self.webhook_events_repo.mark_failed(id, &e.to_string()).await?;
                return Ok(IntakeResponse::Stored);
            }
        };

        let key = dedup_key(provider, &hook);
        let event_id = self
            .webhook_events_repo
            .insert_pending(
                provider,
                &key,
                &hook.event_type,
                &hook.object_type,
                &hook.object_id,
                &hook.payload,
            )
            .await?;

        if self.webhook_events_repo.already_processed(&key, event_id).await? {
            self.webhook_events_repo.mark_processed(event_id).await?;
            return Ok(IntakeResponse::Stored);
        }

        match self.apply(&hook).await {
            Ok(ApplyOutcome::Orphan) => {
                tracing::info!(provider, object_id = %hook.object_id, "orphan webhook event, left for sweep");
            }
            Ok(_) => {
                self.webhook_events_repo.mark_processed(event_id).await?;
            }
            Err(e) => {
                // Transient failure: the event stays pending and the sweep
                // retries it; the gateway still gets its 200.
                tracing::error!(provider, event_id, "webhook processing failed: {e:#}");
                self.webhook_events_repo.record_error(event_id, &e.to_string()).await?;
            }
        }

        Ok(IntakeResponse::Stored)
    }

    /// The business effect of one parsed event. Shared between live intake
    /// and the reconciliation sweep; must stay idempotent.
    pub async fn apply(&self, hook: &ParsedWebhook) -> anyhow::Result<ApplyOutcome> {
        let tx = match self.find_target(hook).await? {
            Some(tx) => tx,
            None => return Ok(ApplyOutcome::Orphan),
        };

        let Some(target) = hook.target_status else {
            return Ok(ApplyOutcome::Informational);
        };

        match classify_transition(tx.status, target) {
            TransitionOutcome::AlreadyApplied => Ok(ApplyOutcome::AlreadyApplied),
            TransitionOutcome::Conflict => {
                self.event_log_repo
                    .append(
                        tx.id,
                        "transition_conflict",
                        "error",
                        &format!(
                            "webhook '{}' wants {} but transaction is {}",
                            hook.event_type,
                            target.as_str(),
                            tx.status.as_str()
                        ),
                        serde_json::json!({ "object_id": hook.object_id }),
                        None,
                        None,
                    )
                    .await?;
                Ok(ApplyOutcome::Conflict)
            }
            TransitionOutcome::Apply => {
                let applied = self.transactions_repo.apply_status(tx.id, target).await?;
                if applied == 0 {
                    // A concurrent delivery won the conditional update.
                    return Ok(ApplyOutcome::AlreadyApplied);
                }

                self.donations_repo
                    .sync_status(tx.id, donation_status_for(target))
                    .await?;
                self.event_log_repo
                    .append(
                        tx.id,
                        target.as_str(),
                        "info",
                        &format!("webhook '{}' applied", hook.event_type),
                        serde_json::json!({ "object_id": hook.object_id }),
                        None,
                        None,
                    )
                    .await?;

                if target == TransactionStatus::Completed {
                    self.register_subscription(&tx, hook).await?;
                }

                Ok(ApplyOutcome::Applied)
            }
        }
    }

    async fn find_target(&self, hook: &ParsedWebhook) -> anyhow::Result<Option<Transaction>> {
        if let Some(tx) = self.transactions_repo.find_by_external_id(&hook.object_id).await? {
            return Ok(Some(tx));
        }
        // The metadata echo covers deliveries that outran the synchronous
        // path's external-id write.
        if let Some(id) = hook.transaction_id {
            return self.transactions_repo.find_by_id(id).await;
        }
        Ok(None)
    }

    async fn register_subscription(&self, tx: &Transaction, hook: &ParsedWebhook) -> anyhow::Result<()> {
        let token = hook
            .payment_method_token
            .as_deref()
            .or(tx.subscription_key.as_deref());
        let Some(token) = token else {
            return Ok(());
        };

        if let Some(reg) = build_registration(tx, token) {
            if hook.payment_method_token.is_some() {
                self.transactions_repo
                    .record_payment_details(
                        tx.id,
                        serde_json::json!({ "payment_method_token": token }),
                    )
                    .await?;
            }
            if tx.subscription_key.is_none() {
                self.transactions_repo.attach_subscription_key(tx.id, token).await?;
            }
            let sub = self.subscriptions_repo.upsert_registration(&reg).await?;
            tracing::info!(
                subscription_id = %sub.id,
                charges_total = sub.charges_total,
                "autopayment subscription registered/updated"
            );
        }

        Ok(())
    }
}

fn hash_bytes(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
