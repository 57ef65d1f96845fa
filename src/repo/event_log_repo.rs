use anyhow::Result;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Append-only audit trail. Written on every state-changing action, read
/// only by humans during reconciliation and disputes, never by business
/// logic.
#[derive(Clone)]
pub struct EventLogRepo {
    pub pool: PgPool,
}

impl EventLogRepo {
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        transaction_id: Uuid,
        action: &str,
        level: &str,
        message: &str,
        context: serde_json::Value,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_event_log (transaction_id, action, level, message, context, client_ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction_id)
        .bind(action)
        .bind(level)
        .bind(message)
        .bind(context)
        .bind(client_ip)
        .bind(user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn append_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transaction_id: Uuid,
        action: &str,
        level: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_event_log (transaction_id, action, level, message, context)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(transaction_id)
        .bind(action)
        .bind(level)
        .bind(message)
        .bind(context)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }
}
