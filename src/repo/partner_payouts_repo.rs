use crate::domain::partner::PartnerPayout;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PartnerPayoutsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str = "id, merchant_id, external_payout_id, status, amount_minor, currency, scheduled_at, processed_at, payload, created_at";

fn row_to_payout(row: sqlx::postgres::PgRow) -> PartnerPayout {
    PartnerPayout {
        id: row.get("id"),
        merchant_id: row.get("merchant_id"),
        external_payout_id: row.get("external_payout_id"),
        status: row.get("status"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        scheduled_at: row.get("scheduled_at"),
        processed_at: row.get("processed_at"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
    }
}

impl PartnerPayoutsRepo {
    /// Keyed by the gateway's payout id, so replayed payout events collapse
    /// into one row.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_by_external_id(
        &self,
        merchant_id: Uuid,
        external_payout_id: &str,
        status: &str,
        amount_minor: i64,
        currency: &str,
        scheduled_at: Option<DateTime<Utc>>,
        processed_at: Option<DateTime<Utc>>,
        payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO partner_payouts (
                id, merchant_id, external_payout_id, status, amount_minor,
                currency, scheduled_at, processed_at, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (external_payout_id) DO UPDATE SET
                status = EXCLUDED.status,
                processed_at = COALESCE(EXCLUDED.processed_at, partner_payouts.processed_at),
                payload = EXCLUDED.payload
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(merchant_id)
        .bind(external_payout_id)
        .bind(status)
        .bind(amount_minor)
        .bind(currency)
        .bind(scheduled_at)
        .bind(processed_at)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_merchant(&self, merchant_id: Uuid) -> Result<Vec<PartnerPayout>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM partner_payouts WHERE merchant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_payout).collect())
    }
}
