use crate::domain::subscription::{
    is_due, subscription_transition_sources, AutopaymentSubscription, SubscriptionStatus,
};
use crate::domain::transaction::{RecurringPeriod, Transaction};
use crate::repo::subscriptions_repo::{SubscriptionRegistration, SubscriptionsRepo};
use crate::service::charge_service::{ChargeService, RecurringOutcome};
use uuid::Uuid;

/// Registration payload for a completed transaction carrying a reusable
/// credential. None when the donor never asked for a recurring donation:
/// a stray saved token must not create an agreement.
pub fn build_registration(tx: &Transaction, token: &str) -> Option<SubscriptionRegistration> {
    if !tx.recurring {
        return None;
    }
    Some(SubscriptionRegistration {
        organization_id: tx.organization_id,
        subscription_key: token.to_string(),
        title: format!("Recurring donation {}", tx.method_slug),
        phone: None,
        amount_minor: tx.amount_minor,
        currency: tx.currency.clone(),
        period: tx.recurring_period.unwrap_or(RecurringPeriod::Monthly),
        method_slug: tx.method_slug.clone(),
    })
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RunStats {
    pub candidates: usize,
    pub charged: usize,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
    pub paused: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct SubscriptionService {
    pub subscriptions_repo: SubscriptionsRepo,
    pub charge_service: ChargeService,
    pub failure_threshold: i32,
}

impl SubscriptionService {
    /// Timer-driven entry point: charge every active subscription of the
    /// period that is due. Safe to invoke repeatedly; a subscription charged
    /// in this period is no longer due on the next call.
    pub async fn run_due_charges(&self, period: RecurringPeriod) -> anyhow::Result<RunStats> {
        let now = chrono::Utc::now();
        let subs = self.subscriptions_repo.list_active_by_period(period).await?;

        let mut stats = RunStats {
            candidates: subs.len(),
            ..Default::default()
        };

        for sub in subs {
            if !is_due(sub.last_charged_at, sub.period, now) {
                stats.skipped += 1;
                continue;
            }

            stats.charged += 1;
            match self.charge_service.create_recurring_charge(&sub).await {
                Ok((transaction_id, RecurringOutcome::Completed)) => {
                    stats.completed += 1;
                    self.record_success(&sub).await?;
                    tracing::info!(%transaction_id, subscription_id = %sub.id, "recurring charge completed");
                }
                Ok((transaction_id, RecurringOutcome::Pending)) => {
                    // Resolution arrives via webhook; the completion hook
                    // updates the counters then.
                    stats.pending += 1;
                    tracing::info!(%transaction_id, subscription_id = %sub.id, "recurring charge pending");
                }
                Ok((transaction_id, RecurringOutcome::Failed)) => {
                    stats.failed += 1;
                    if self.record_failure(&sub).await? {
                        stats.paused += 1;
                        tracing::warn!(
                            %transaction_id,
                            subscription_id = %sub.id,
                            "subscription paused after consecutive failures"
                        );
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(subscription_id = %sub.id, "recurring charge errored: {e:#}");
                    if self.record_failure(&sub).await? {
                        stats.paused += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn record_success(&self, sub: &AutopaymentSubscription) -> anyhow::Result<()> {
        self.subscriptions_repo
            .upsert_registration(&SubscriptionRegistration {
                organization_id: sub.organization_id,
                subscription_key: sub.subscription_key.clone(),
                title: sub.title.clone(),
                phone: sub.phone.clone(),
                amount_minor: sub.amount_minor,
                currency: sub.currency.clone(),
                period: sub.period,
                method_slug: sub.method_slug.clone(),
            })
            .await?;
        Ok(())
    }

    /// Returns true when the failure tipped the subscription into paused.
    async fn record_failure(&self, sub: &AutopaymentSubscription) -> anyhow::Result<bool> {
        let failures = self.subscriptions_repo.record_failure(sub.id).await?;
        if failures >= self.failure_threshold {
            let paused = self
                .subscriptions_repo
                .pause_if_threshold(sub.id, self.failure_threshold)
                .await?;
            return Ok(paused > 0);
        }
        Ok(false)
    }

    pub async fn pause(&self, id: Uuid) -> anyhow::Result<bool> {
        let n = self
            .subscriptions_repo
            .set_status(
                id,
                SubscriptionStatus::Paused,
                &subscription_transition_sources(SubscriptionStatus::Paused),
            )
            .await?;
        Ok(n > 0)
    }

    pub async fn resume(&self, id: Uuid) -> anyhow::Result<bool> {
        let n = self
            .subscriptions_repo
            .set_status(
                id,
                SubscriptionStatus::Active,
                &subscription_transition_sources(SubscriptionStatus::Active),
            )
            .await?;
        Ok(n > 0)
    }

    pub async fn cancel(&self, id: Uuid) -> anyhow::Result<bool> {
        let n = self
            .subscriptions_repo
            .set_status(
                id,
                SubscriptionStatus::Cancelled,
                &subscription_transition_sources(SubscriptionStatus::Cancelled),
            )
            .await?;
        Ok(n > 0)
    }
}
