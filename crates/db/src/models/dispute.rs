use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "dispute_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisputeStatus {
    #[default]
    NeedsResponse,
    UnderReview,
    Won,
    Lost,
}

impl DisputeStatus {
    /// Map a processor dispute status onto ours. The processor has several
    /// flavors of "waiting on us" and "waiting on the bank".
    pub fn from_processor(status: &str) -> Self {
        match status {
            "won" => DisputeStatus::Won,
            "lost" => DisputeStatus::Lost,
            "under_review" | "warning_under_review" => DisputeStatus::UnderReview,
            _ => DisputeStatus::NeedsResponse,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, DisputeStatus::NeedsResponse | DisputeStatus::UnderReview)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Dispute {
    pub id: Uuid,
    pub pledge_id: Option<Uuid>,
    pub processor_dispute_id: String,
    pub payment_intent_id: Option<String>,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub status: DisputeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertDispute {
    pub pledge_id: Option<Uuid>,
    pub processor_dispute_id: String,
    pub payment_intent_id: Option<String>,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub status: DisputeStatus,
}

impl Dispute {
    pub async fn upsert(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpsertDispute,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            Dispute,
            r#"INSERT INTO disputes
                   (id, pledge_id, processor_dispute_id, payment_intent_id, amount_cents, reason, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT(processor_dispute_id) DO UPDATE SET
                   pledge_id = COALESCE(excluded.pledge_id, disputes.pledge_id),
                   amount_cents = excluded.amount_cents,
                   reason = COALESCE(excluded.reason, disputes.reason),
                   status = excluded.status,
                   updated_at = datetime('now', 'subsec')
               RETURNING id as "id!: Uuid", pledge_id as "pledge_id: Uuid", processor_dispute_id, payment_intent_id, amount_cents as "amount_cents!: i64", reason, status as "status!: DisputeStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.pledge_id,
            data.processor_dispute_id,
            data.payment_intent_id,
            data.amount_cents,
            data.reason,
            data.status
        )
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Dispute,
            r#"SELECT id as "id!: Uuid", pledge_id as "pledge_id: Uuid", processor_dispute_id, payment_intent_id, amount_cents as "amount_cents!: i64", reason, status as "status!: DisputeStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM disputes
               ORDER BY created_at DESC"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count_open(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM disputes WHERE status IN ('needs_response', 'under_review')"#
        )
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn upsert_updates_status_in_place() {
        let db = test_support::db().await;
        let mut data = UpsertDispute {
            pledge_id: None,
            processor_dispute_id: "dp_1".to_string(),
            payment_intent_id: Some("pi_1".to_string()),
            amount_cents: 5_000,
            reason: Some("fraudulent".to_string()),
            status: DisputeStatus::NeedsResponse,
        };
        let created = Dispute::upsert(&db.pool, Uuid::new_v4(), &data).await.unwrap();
        assert_eq!(Dispute::count_open(&db.pool).await.unwrap(), 1);

        data.status = DisputeStatus::from_processor("lost");
        data.reason = None;
        let closed = Dispute::upsert(&db.pool, Uuid::new_v4(), &data).await.unwrap();
        assert_eq!(closed.id, created.id);
        assert_eq!(closed.status, DisputeStatus::Lost);
        assert_eq!(closed.reason.as_deref(), Some("fraudulent"));
        assert_eq!(Dispute::count_open(&db.pool).await.unwrap(), 0);
    }

    #[test]
    fn processor_statuses_map() {
        assert_eq!(
            DisputeStatus::from_processor("warning_needs_response"),
            DisputeStatus::NeedsResponse
        );
        assert_eq!(DisputeStatus::from_processor("under_review"), DisputeStatus::UnderReview);
        assert!(!DisputeStatus::Won.is_open());
    }
}
