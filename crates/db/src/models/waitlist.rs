use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "waitlist_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WaitlistStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Pre-registration entry gating sign-up while signups are restricted
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub email: String,
    pub reason: Option<String>,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateWaitlistEntry {
    pub email: String,
    pub reason: Option<String>,
}

impl WaitlistEntry {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        email: &str,
        reason: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            WaitlistEntry,
            r#"INSERT INTO waitlist_entries (id, email, reason)
               VALUES ($1, $2, $3)
               RETURNING id as "id!: Uuid", email, reason, status as "status!: WaitlistStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            email,
            reason
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            WaitlistEntry,
            r#"SELECT id as "id!: Uuid", email, reason, status as "status!: WaitlistStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM waitlist_entries
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            WaitlistEntry,
            r#"SELECT id as "id!: Uuid", email, reason, status as "status!: WaitlistStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM waitlist_entries
               WHERE email = $1"#,
            email
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            WaitlistEntry,
            r#"SELECT id as "id!: Uuid", email, reason, status as "status!: WaitlistStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM waitlist_entries
               WHERE $1 IS NULL OR status = $1
               ORDER BY created_at ASC"#,
            status
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: WaitlistStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            WaitlistEntry,
            r#"UPDATE waitlist_entries
               SET status = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, reason, status as "status!: WaitlistStatus", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            status
        )
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn filter_by_status() {
        let db = test_support::db().await;
        let a = WaitlistEntry::create(&db.pool, Uuid::new_v4(), "a@example.com", None)
            .await
            .unwrap();
        WaitlistEntry::create(&db.pool, Uuid::new_v4(), "b@example.com", Some("escrow"))
            .await
            .unwrap();

        WaitlistEntry::update_status(&db.pool, a.id, WaitlistStatus::Approved)
            .await
            .unwrap();

        let approved = WaitlistEntry::list(&db.pool, Some(WaitlistStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].email, "a@example.com");
        assert_eq!(WaitlistEntry::list(&db.pool, None).await.unwrap().len(), 2);
    }
}
