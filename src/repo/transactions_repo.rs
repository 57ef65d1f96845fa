use crate::domain::transaction::{allowed_predecessors, RecurringPeriod, Transaction, TransactionStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

pub struct NewTransaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub fundraiser_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub project_stage_id: Option<Uuid>,
    pub method_config_id: Option<Uuid>,
    pub method_slug: String,
    pub idempotency_key: Option<String>,
    pub request_hash: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub fee_minor: i64,
    pub recurring: bool,
    pub recurring_period: Option<RecurringPeriod>,
    pub subscription_key: Option<String>,
    pub return_url: Option<String>,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Subset replayed to a client retrying the same Idempotency-Key.
#[derive(Debug, Clone)]
pub struct StoredCharge {
    pub transaction_id: Uuid,
    pub status: String,
    pub payment_url: Option<String>,
    pub qr_payload: Option<String>,
    pub request_hash: Option<String>,
}

#[derive(Clone)]
pub struct TransactionsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str = "id, organization_id, fundraiser_id, project_id, project_stage_id, method_config_id, method_slug, external_id, amount_minor, currency, fee_minor, status, subscription_key, recurring, recurring_period, payment_details, gateway_response, payment_url, qr_payload, return_url, success_url, failure_url, expires_at, paid_at, failed_at, refunded_at, created_at";

fn row_to_transaction(row: sqlx::postgres::PgRow) -> Transaction {
    let status: String = row.get("status");
    let period: Option<String> = row.get("recurring_period");
    Transaction {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        fundraiser_id: row.get("fundraiser_id"),
        project_id: row.get("project_id"),
        project_stage_id: row.get("project_stage_id"),
        method_config_id: row.get("method_config_id"),
        method_slug: row.get("method_slug"),
        external_id: row.get("external_id"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        fee_minor: row.get("fee_minor"),
        status: TransactionStatus::parse(&status).unwrap_or(TransactionStatus::Pending),
        subscription_key: row.get("subscription_key"),
        recurring: row.get("recurring"),
        recurring_period: period.as_deref().and_then(RecurringPeriod::parse),
        payment_details: row.get("payment_details"),
        gateway_response: row.get("gateway_response"),
        payment_url: row.get("payment_url"),
        qr_payload: row.get("qr_payload"),
        return_url: row.get("return_url"),
        success_url: row.get("success_url"),
        failure_url: row.get("failure_url"),
        expires_at: row.get("expires_at"),
        paid_at: row.get("paid_at"),
        failed_at: row.get("failed_at"),
        refunded_at: row.get("refunded_at"),
        created_at: row.get("created_at"),
    }
}

impl TransactionsRepo {
    pub async fn find_by_idempotency(
        &self,
        organization_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<StoredCharge>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, payment_url, qr_payload, request_hash
            FROM transactions
            WHERE organization_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(organization_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredCharge {
            transaction_id: r.get("id"),
            status: r.get("status"),
            payment_url: r.get("payment_url"),
            qr_payload: r.get("qr_payload"),
            request_hash: r.get("request_hash"),
        }))
    }

    pub async fn insert_pending_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        data: &NewTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, organization_id, fundraiser_id, project_id, project_stage_id,
                method_config_id, method_slug, idempotency_key, request_hash,
                amount_minor, currency, fee_minor, status, recurring, recurring_period,
                subscription_key, return_url, success_url, failure_url, expires_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9,
                $10, $11, $12, 'pending', $13, $14,
                $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(data.id)
        .bind(data.organization_id)
        .bind(data.fundraiser_id)
        .bind(data.project_id)
        .bind(data.project_stage_id)
        .bind(data.method_config_id)
        .bind(&data.method_slug)
        .bind(&data.idempotency_key)
        .bind(&data.request_hash)
        .bind(data.amount_minor)
        .bind(&data.currency)
        .bind(data.fee_minor)
        .bind(data.recurring)
        .bind(data.recurring_period.map(|p| p.as_str()))
        .bind(&data.subscription_key)
        .bind(&data.return_url)
        .bind(&data.success_url)
        .bind(&data.failure_url)
        .bind(data.expires_at)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    /// Stores the synchronous gateway response on a still-pending row.
    pub async fn record_gateway_result(
        &self,
        id: Uuid,
        external_id: Option<&str>,
        payment_url: Option<&str>,
        qr_payload: Option<&str>,
        gateway_response: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET external_id = COALESCE($2, external_id),
                payment_url = $3,
                qr_payload = $4,
                gateway_response = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(external_id)
        .bind(payment_url)
        .bind(qr_payload)
        .bind(gateway_response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_payment_details(&self, id: Uuid, details: serde_json::Value) -> Result<()> {
        sqlx::query("UPDATE transactions SET payment_details = $2 WHERE id = $1")
            .bind(id)
            .bind(details)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The one write path for status. Conditional on the allowed predecessor
    /// set, so concurrent webhook deliveries racing a synchronous response
    /// cannot both apply; the loser sees zero rows affected.
    pub async fn apply_status(&self, id: Uuid, target: TransactionStatus) -> Result<u64> {
        let allowed: Vec<&str> = allowed_predecessors(target).iter().map(|s| s.as_str()).collect();

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                paid_at = CASE WHEN $2 = 'completed' THEN now() ELSE paid_at END,
                failed_at = CASE WHEN $2 IN ('failed', 'cancelled') THEN now() ELSE failed_at END,
                refunded_at = CASE WHEN $2 = 'refunded' THEN now() ELSE refunded_at END
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(target.as_str())
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(row_to_transaction))
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_transaction))
    }

    /// Pending charges whose confirmation window has lapsed; the sweep
    /// cancels them through the normal conditional transition.
    pub async fn list_expired_pending(&self, limit: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM transactions
            WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= now()
            ORDER BY expires_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    pub async fn attach_subscription_key(&self, id: Uuid, subscription_key: &str) -> Result<()> {
        sqlx::query("UPDATE transactions SET subscription_key = $2 WHERE id = $1")
            .bind(id)
            .bind(subscription_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
