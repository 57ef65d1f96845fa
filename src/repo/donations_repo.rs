use crate::domain::donation::DonationStatus;
use anyhow::Result;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

pub struct NewDonation {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub organization_id: Uuid,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub anonymous: bool,
    pub message: Option<String>,
    pub wants_receipt: bool,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Clone)]
pub struct DonationsRepo {
    pub pool: PgPool,
}

impl DonationsRepo {
    pub async fn insert_tx(tx: &mut sqlx::Transaction<'_, Postgres>, data: &NewDonation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO donations (
                id, transaction_id, organization_id, donor_name, donor_email,
                anonymous, message, wants_receipt, amount_minor, currency, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
            "#,
        )
        .bind(data.id)
        .bind(data.transaction_id)
        .bind(data.organization_id)
        .bind(&data.donor_name)
        .bind(&data.donor_email)
        .bind(data.anonymous)
        .bind(&data.message)
        .bind(data.wants_receipt)
        .bind(data.amount_minor)
        .bind(&data.currency)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    /// Donation.status is a projection of Transaction.status; the amount is
    /// written once at creation and never diverges.
    pub async fn sync_status(&self, transaction_id: Uuid, status: DonationStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE donations SET status = $2 WHERE transaction_id = $1")
            .bind(transaction_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
