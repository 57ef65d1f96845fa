use crate::domain::method::PaymentMethodConfig;
use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentMethodsRepo {
    pub pool: PgPool,
}

fn row_to_config(row: sqlx::postgres::PgRow) -> PaymentMethodConfig {
    PaymentMethodConfig {
        id: row.get("id"),
        slug: row.get("slug"),
        gateway: row.get("gateway"),
        title: row.get("title"),
        fee_percent_bp: row.get("fee_percent_bp"),
        fee_fixed_minor: row.get("fee_fixed_minor"),
        min_amount_minor: row.get("min_amount_minor"),
        max_amount_minor: row.get("max_amount_minor"),
        is_active: row.get("is_active"),
        test_mode: row.get("test_mode"),
        settings: row.get("settings"),
        created_at: row.get("created_at"),
    }
}

const COLUMNS: &str = "id, slug, gateway, title, fee_percent_bp, fee_fixed_minor, min_amount_minor, max_amount_minor, is_active, test_mode, settings, created_at";

impl PaymentMethodsRepo {
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<PaymentMethodConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM payment_method_configs WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_config))
    }

    pub async fn list_all(&self) -> Result<Vec<PaymentMethodConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM payment_method_configs ORDER BY slug ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_config).collect())
    }

    pub async fn insert(&self, cfg: &PaymentMethodConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_method_configs (
                id, slug, gateway, title, fee_percent_bp, fee_fixed_minor,
                min_amount_minor, max_amount_minor, is_active, test_mode, settings
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(cfg.id)
        .bind(&cfg.slug)
        .bind(&cfg.gateway)
        .bind(&cfg.title)
        .bind(cfg.fee_percent_bp)
        .bind(cfg.fee_fixed_minor)
        .bind(cfg.min_amount_minor)
        .bind(cfg.max_amount_minor)
        .bind(cfg.is_active)
        .bind(cfg.test_mode)
        .bind(&cfg.settings)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Configs referenced by historical transactions are never deleted,
    /// only edited or deactivated.
    pub async fn update(
        &self,
        slug: &str,
        is_active: bool,
        min_amount_minor: i64,
        max_amount_minor: i64,
        fee_percent_bp: i32,
        fee_fixed_minor: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_method_configs
            SET is_active = $2, min_amount_minor = $3, max_amount_minor = $4,
                fee_percent_bp = $5, fee_fixed_minor = $6
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .bind(is_active)
        .bind(min_amount_minor)
        .bind(max_amount_minor)
        .bind(fee_percent_bp)
        .bind(fee_fixed_minor)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentMethodConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM payment_method_configs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_config))
    }
}
