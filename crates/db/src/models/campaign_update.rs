use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Progress post from the campaign team to its backers
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CampaignUpdate {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateCampaignUpdate {
    pub title: String,
    pub content: String,
}

impl CampaignUpdate {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        campaign_id: Uuid,
        author_id: Uuid,
        data: &CreateCampaignUpdate,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            CampaignUpdate,
            r#"INSERT INTO campaign_updates (id, campaign_id, author_id, title, content)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", author_id as "author_id!: Uuid", title, content, created_at as "created_at!: DateTime<Utc>""#,
            id,
            campaign_id,
            author_id,
            data.title,
            data.content
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_campaign(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            CampaignUpdate,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", author_id as "author_id!: Uuid", title, content, created_at as "created_at!: DateTime<Utc>"
               FROM campaign_updates
               WHERE campaign_id = $1
               ORDER BY created_at DESC"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }
}
