use crate::domain::subscription::{AutopaymentSubscription, SubscriptionStatus};
use crate::domain::transaction::RecurringPeriod;
use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct SubscriptionRegistration {
    pub organization_id: Uuid,
    pub subscription_key: String,
    pub title: String,
    pub phone: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub period: RecurringPeriod,
    pub method_slug: String,
}

#[derive(Clone)]
pub struct SubscriptionsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str = "id, organization_id, subscription_key, title, phone, amount_minor, currency, period, method_slug, status, consecutive_failures, charges_total, first_payment_at, last_charged_at, created_at";

fn row_to_subscription(row: sqlx::postgres::PgRow) -> AutopaymentSubscription {
    let status: String = row.get("status");
    let period: String = row.get("period");
    AutopaymentSubscription {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        subscription_key: row.get("subscription_key"),
        title: row.get("title"),
        phone: row.get("phone"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        period: RecurringPeriod::parse(&period).unwrap_or(RecurringPeriod::Monthly),
        method_slug: row.get("method_slug"),
        status: SubscriptionStatus::parse(&status).unwrap_or(SubscriptionStatus::Pending),
        consecutive_failures: row.get("consecutive_failures"),
        charges_total: row.get("charges_total"),
        first_payment_at: row.get("first_payment_at"),
        last_charged_at: row.get("last_charged_at"),
        created_at: row.get("created_at"),
    }
}

impl SubscriptionsRepo {
    /// Registration is an upsert keyed (organization, subscription key):
    /// the first completed charge creates the agreement and stamps
    /// first_payment_at; every later completion resets the failure counter
    /// and bumps totals. A paused or cancelled agreement is never
    /// reactivated here.
    pub async fn upsert_registration(&self, reg: &SubscriptionRegistration) -> Result<AutopaymentSubscription> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO autopayment_subscriptions (
                id, organization_id, subscription_key, title, phone, amount_minor,
                currency, period, method_slug, status, consecutive_failures,
                charges_total, first_payment_at, last_charged_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', 0, 1, now(), now())
            ON CONFLICT (organization_id, subscription_key) DO UPDATE SET
                consecutive_failures = 0,
                charges_total = autopayment_subscriptions.charges_total + 1,
                last_charged_at = now(),
                status = CASE
                    WHEN autopayment_subscriptions.status = 'pending' THEN 'active'
                    ELSE autopayment_subscriptions.status
                END
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(reg.organization_id)
        .bind(&reg.subscription_key)
        .bind(&reg.title)
        .bind(&reg.phone)
        .bind(reg.amount_minor)
        .bind(&reg.currency)
        .bind(reg.period.as_str())
        .bind(&reg.method_slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_subscription(row))
    }

    pub async fn find_by_key(&self, organization_id: Uuid, subscription_key: &str) -> Result<Option<AutopaymentSubscription>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM autopayment_subscriptions WHERE organization_id = $1 AND subscription_key = $2"
        ))
        .bind(organization_id)
        .bind(subscription_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_subscription))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AutopaymentSubscription>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM autopayment_subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_subscription))
    }

    pub async fn list_active_by_period(&self, period: RecurringPeriod) -> Result<Vec<AutopaymentSubscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM autopayment_subscriptions WHERE status = 'active' AND period = $1 ORDER BY created_at ASC"
        ))
        .bind(period.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    pub async fn record_failure(&self, id: Uuid) -> Result<i32> {
        let row = sqlx::query(
            r#"
            UPDATE autopayment_subscriptions
            SET consecutive_failures = consecutive_failures + 1
            WHERE id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("consecutive_failures"))
    }

    pub async fn pause_if_threshold(&self, id: Uuid, threshold: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE autopayment_subscriptions
            SET status = 'paused'
            WHERE id = $1 AND status = 'active' AND consecutive_failures >= $2
            "#,
        )
        .bind(id)
        .bind(threshold)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Conditional transition; the allowed-from set comes from the status
    /// machine so a cancelled agreement can never resurrect.
    pub async fn set_status(
        &self,
        id: Uuid,
        target: SubscriptionStatus,
        allowed_from: &[SubscriptionStatus],
    ) -> Result<u64> {
        let allowed: Vec<&str> = allowed_from.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            "UPDATE autopayment_subscriptions SET status = $2 WHERE id = $1 AND status = ANY($3)",
        )
        .bind(id)
        .bind(target.as_str())
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
