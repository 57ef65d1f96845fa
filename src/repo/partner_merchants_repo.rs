use crate::domain::partner::{MerchantStatus, PartnerMerchant};
use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PartnerMerchantsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str = "id, organization_id, status, external_partner_id, contract_id, payout_account_id, payout_account_status, credentials_enc, activated_at, last_synced_at, created_at";

fn row_to_merchant(row: sqlx::postgres::PgRow) -> PartnerMerchant {
    let status: String = row.get("status");
    PartnerMerchant {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        status: MerchantStatus::parse(&status).unwrap_or(MerchantStatus::Draft),
        external_partner_id: row.get("external_partner_id"),
        contract_id: row.get("contract_id"),
        payout_account_id: row.get("payout_account_id"),
        payout_account_status: row.get("payout_account_status"),
        credentials_enc: row.get("credentials_enc"),
        activated_at: row.get("activated_at"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
    }
}

impl PartnerMerchantsRepo {
    pub async fn create_draft(&self, organization_id: Uuid) -> Result<PartnerMerchant> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO partner_merchants (id, organization_id, status)
            VALUES ($1, $2, 'draft')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_merchant(row))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PartnerMerchant>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM partner_merchants WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(row_to_merchant))
    }

    /// A partial unique index guarantees at most one active merchant per
    /// organization, so this lookup is unambiguous.
    pub async fn active_for_org(&self, organization_id: Uuid) -> Result<Option<PartnerMerchant>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM partner_merchants WHERE organization_id = $1 AND status = 'active'"
        ))
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_merchant))
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        target: MerchantStatus,
        allowed_from: &[MerchantStatus],
    ) -> Result<u64> {
        let allowed: Vec<&str> = allowed_from.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            r#"
            UPDATE partner_merchants
            SET status = $2,
                activated_at = CASE WHEN $2 = 'active' THEN COALESCE(activated_at, now()) ELSE activated_at END
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

    pub async fn update_onboarding(
        &self,
        id: Uuid,
        external_partner_id: Option<&str>,
        contract_id: Option<&str>,
        payout_account_id: Option<&str>,
        payout_account_status: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE partner_merchants
            SET external_partner_id = COALESCE($2, external_partner_id),
                contract_id = COALESCE($3, contract_id),
                payout_account_id = COALESCE($4, payout_account_id),
                payout_account_status = COALESCE($5, payout_account_status),
                last_synced_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(external_partner_id)
        .bind(contract_id)
        .bind(payout_account_id)
        .bind(payout_account_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_external_partner_id(&self, external_partner_id: &str) -> Result<Option<PartnerMerchant>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM partner_merchants WHERE external_partner_id = $1"
        ))
        .bind(external_partner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_merchant))
    }
}
