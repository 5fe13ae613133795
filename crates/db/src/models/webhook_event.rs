use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Processor event already handled; used to skip redeliveries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub async fn exists(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM webhook_events WHERE id = $1"#,
            id
        )
        .fetch_one(pool)
        .await
        .map(|count| count > 0)
    }

    /// Returns false if the event was already recorded.
    pub async fn record(pool: &SqlitePool, id: &str, event_type: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query!(
            r#"INSERT INTO webhook_events (id, event_type)
               VALUES ($1, $2)
               ON CONFLICT(id) DO NOTHING"#,
            id,
            event_type
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
