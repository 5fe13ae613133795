use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "refund_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefundStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Refund {
    pub id: Uuid,
    pub pledge_id: Uuid,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub processor_refund_id: Option<String>,
    pub requested_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        pledge_id: Uuid,
        amount_cents: i64,
        reason: Option<&str>,
        requested_by: Option<Uuid>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as!(
            Refund,
            r#"INSERT INTO refunds (id, pledge_id, amount_cents, reason, requested_by)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id as "id!: Uuid", pledge_id as "pledge_id!: Uuid", amount_cents as "amount_cents!: i64", reason, status as "status!: RefundStatus", processor_refund_id, requested_by as "requested_by: Uuid", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            pledge_id,
            amount_cents,
            reason,
            requested_by
        )
        .fetch_one(executor)
        .await
    }

    pub async fn mark_succeeded(
        pool: &SqlitePool,
        id: Uuid,
        processor_refund_id: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            Refund,
            r#"UPDATE refunds
               SET status = 'succeeded',
                   processor_refund_id = $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", pledge_id as "pledge_id!: Uuid", amount_cents as "amount_cents!: i64", reason, status as "status!: RefundStatus", processor_refund_id, requested_by as "requested_by: Uuid", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            processor_refund_id
        )
        .fetch_one(pool)
        .await
    }

    pub async fn mark_failed(pool: &SqlitePool, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            Refund,
            r#"UPDATE refunds
               SET status = 'failed', updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", pledge_id as "pledge_id!: Uuid", amount_cents as "amount_cents!: i64", reason, status as "status!: RefundStatus", processor_refund_id, requested_by as "requested_by: Uuid", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_pledge(
        pool: &SqlitePool,
        pledge_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Refund,
            r#"SELECT id as "id!: Uuid", pledge_id as "pledge_id!: Uuid", amount_cents as "amount_cents!: i64", reason, status as "status!: RefundStatus", processor_refund_id, requested_by as "requested_by: Uuid", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM refunds
               WHERE pledge_id = $1
               ORDER BY created_at DESC"#,
            pledge_id
        )
        .fetch_all(pool)
        .await
    }

    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Refund,
            r#"SELECT id as "id!: Uuid", pledge_id as "pledge_id!: Uuid", amount_cents as "amount_cents!: i64", reason, status as "status!: RefundStatus", processor_refund_id, requested_by as "requested_by: Uuid", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM refunds
               ORDER BY created_at DESC"#
        )
        .fetch_all(pool)
        .await
    }
}
