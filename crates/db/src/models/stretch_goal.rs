use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct StretchGoal {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_cents: i64,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct StretchGoalProgress {
    #[serde(flatten)]
    #[ts(flatten)]
    pub goal: StretchGoal,
    pub reached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateStretchGoal {
    pub title: String,
    pub description: Option<String>,
    pub target_cents: i64,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateStretchGoal {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_cents: Option<i64>,
    pub position: Option<i64>,
}

impl StretchGoal {
    pub fn with_progress(self, raised_cents: i64) -> StretchGoalProgress {
        let reached = raised_cents >= self.target_cents;
        StretchGoalProgress {
            goal: self,
            reached,
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        campaign_id: Uuid,
        data: &CreateStretchGoal,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            StretchGoal,
            r#"INSERT INTO stretch_goals (id, campaign_id, title, description, target_cents, position)
               VALUES ($1, $2, $3, $4, $5,
                       COALESCE($6, (SELECT COALESCE(MAX(position), 0) + 1 FROM stretch_goals WHERE campaign_id = $2)))
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, target_cents as "target_cents!: i64", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            campaign_id,
            data.title,
            data.description,
            data.target_cents,
            data.position
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            StretchGoal,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, target_cents as "target_cents!: i64", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM stretch_goals
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_campaign(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            StretchGoal,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, target_cents as "target_cents!: i64", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM stretch_goals
               WHERE campaign_id = $1
               ORDER BY target_cents ASC, position ASC"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateStretchGoal,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            StretchGoal,
            r#"UPDATE stretch_goals
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   target_cents = COALESCE($4, target_cents),
                   position = COALESCE($5, position),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", title, description, target_cents as "target_cents!: i64", position as "position!: i64", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.title,
            data.description,
            data.target_cents,
            data.position
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM stretch_goals WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
