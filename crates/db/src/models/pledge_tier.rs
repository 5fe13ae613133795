use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Reward level a backer can pick at checkout
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PledgeTier {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub is_active: bool,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePledgeTier {
    pub title: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdatePledgeTier {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub is_active: Option<bool>,
    pub position: Option<i64>,
}

impl PledgeTier {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        campaign_id: Uuid,
        data: &CreatePledgeTier,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            PledgeTier,
            r#"INSERT INTO pledge_tiers (id, campaign_id, title, description, amount_cents, position)
               VALUES ($1, $2, $3, $4, $5,
                       COALESCE($6, (SELECT COALESCE(MAX(position), 0) + 1 FROM pledge_tiers WHERE campaign_id = $2)))
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, amount_cents as "amount_cents!: i64", is_active as "is_active!: bool", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            campaign_id,
            data.title,
            data.description,
            data.amount_cents,
            data.position
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            PledgeTier,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, amount_cents as "amount_cents!: i64", is_active as "is_active!: bool", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledge_tiers
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_campaign(
        pool: &SqlitePool,
        campaign_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            PledgeTier,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, amount_cents as "amount_cents!: i64", is_active as "is_active!: bool", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM pledge_tiers
               WHERE campaign_id = $1 AND ($2 = 0 OR is_active = 1)
               ORDER BY position ASC, amount_cents ASC"#,
            campaign_id,
            active_only
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdatePledgeTier,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            PledgeTier,
            r#"UPDATE pledge_tiers
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   amount_cents = COALESCE($4, amount_cents),
                   is_active = COALESCE($5, is_active),
                   position = COALESCE($6, position),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, amount_cents as "amount_cents!: i64", is_active as "is_active!: bool", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.title,
            data.description,
            data.amount_cents,
            data.is_active,
            data.position
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM pledge_tiers WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
