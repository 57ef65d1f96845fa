use anyhow::Result;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct StoredWebhookEvent {
    pub id: i64,
    pub provider: String,
    pub dedup_key: String,
    pub event_type: String,
    pub object_type: String,
    pub object_id: String,
    pub payload: serde_json::Value,
    pub processing_status: String,
    pub attempts: i32,
}

/// The write-ahead event ledger. A row is inserted before any business
/// mutation runs, so a crash mid-processing leaves a replayable record
/// rather than a lost notification.
#[derive(Clone)]
pub struct WebhookEventsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str =
    "id, provider, dedup_key, event_type, object_type, object_id, payload, processing_status, attempts";

fn row_to_event(row: sqlx::postgres::PgRow) -> StoredWebhookEvent {
    StoredWebhookEvent {
        id: row.get("id"),
        provider: row.get("provider"),
        dedup_key: row.get("dedup_key"),
        event_type: row.get("event_type"),
        object_type: row.get("object_type"),
        object_id: row.get("object_id"),
        payload: row.get("payload"),
        processing_status: row.get("processing_status"),
        attempts: row.get("attempts"),
    }
}

impl WebhookEventsRepo {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending(
        &self,
        provider: &str,
        dedup_key: &str,
        event_type: &str,
        object_type: &str,
        object_id: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhook_events (provider, dedup_key, event_type, object_type, object_id, payload, processing_status, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0)
            RETURNING id
            "#,
        )
        .bind(provider)
        .bind(dedup_key)
        .bind(event_type)
        .bind(object_type)
        .bind(object_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Idempotency short-circuit: has an event with this dedup key already
    /// been applied?
    pub async fn already_processed(&self, dedup_key: &str, current_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM webhook_events
                WHERE dedup_key = $1 AND processing_status = 'processed' AND id <> $2
            ) AS seen
            "#,
        )
        .bind(dedup_key)
        .bind(current_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("seen"))
    }

    pub async fn mark_processed(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET processing_status = 'processed', processed_at = now(), processing_error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET processing_status = 'failed', processed_at = now(), processing_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records the failure without leaving `pending`, so the sweep retries
    /// transient errors; `mark_failed` is for events that will never apply.
    pub async fn record_error(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET processing_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn bump_attempts(&self, id: i64) -> Result<i32> {
        let row = sqlx::query(
            "UPDATE webhook_events SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("attempts"))
    }

    /// Unresolved events (orphans, crash leftovers) older than the given
    /// window, for the reconciliation sweep.
    pub async fn pending_older_than(&self, minutes: i64, limit: i64) -> Result<Vec<StoredWebhookEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}
            FROM webhook_events
            WHERE processing_status = 'pending' AND received_at <= now() - ($1 * interval '1 minute')
            ORDER BY id ASC
            LIMIT $2
            "#
        ))
        .bind(minutes)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_event).collect())
    }
}
