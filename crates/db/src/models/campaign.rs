use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::user::{User, UserRole};

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Live,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Allowed lifecycle moves: draft -> live -> completed, and draft|live -> cancelled.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (CampaignStatus::Draft, CampaignStatus::Live)
                | (CampaignStatus::Live, CampaignStatus::Completed)
                | (CampaignStatus::Draft, CampaignStatus::Cancelled)
                | (CampaignStatus::Live, CampaignStatus::Cancelled)
        )
    }

    /// Visible to anonymous visitors
    pub fn is_public(self) -> bool {
        matches!(self, CampaignStatus::Live | CampaignStatus::Completed)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Campaign {
    pub id: Uuid,
    pub maker_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub title: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub funding_goal_cents: i64,
    pub status: CampaignStatus,
    pub deadline_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign plus its funding totals from captured pledges, net of refunds
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CampaignWithFunding {
    #[serde(flatten)]
    #[ts(flatten)]
    pub campaign: Campaign,
    pub raised_cents: i64,
    pub backer_count: i64,
}

impl std::ops::Deref for CampaignWithFunding {
    type Target = Campaign;
    fn deref(&self) -> &Self::Target {
        &self.campaign
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateCampaign {
    pub title: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub funding_goal_cents: i64,
    pub deadline_at: Option<DateTime<Utc>>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateCampaign {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub funding_goal_cents: Option<i64>,
    pub deadline_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CampaignStatusCount {
    pub status: CampaignStatus,
    pub count: i64,
}

/// Flat row behind [`CampaignWithFunding`]
struct CampaignFundingRow {
    id: Uuid,
    maker_id: Uuid,
    organization_id: Option<Uuid>,
    title: String,
    summary: Option<String>,
    description: Option<String>,
    repo_url: Option<String>,
    funding_goal_cents: i64,
    status: CampaignStatus,
    deadline_at: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    raised_cents: i64,
    backer_count: i64,
}

impl From<CampaignFundingRow> for CampaignWithFunding {
    fn from(row: CampaignFundingRow) -> Self {
        CampaignWithFunding {
            campaign: Campaign {
                id: row.id,
                maker_id: row.maker_id,
                organization_id: row.organization_id,
                title: row.title,
                summary: row.summary,
                description: row.description,
                repo_url: row.repo_url,
                funding_goal_cents: row.funding_goal_cents,
                status: row.status,
                deadline_at: row.deadline_at,
                published_at: row.published_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            raised_cents: row.raised_cents,
            backer_count: row.backer_count,
        }
    }
}

impl Campaign {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        maker_id: Uuid,
        data: &CreateCampaign,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            Campaign,
            r#"INSERT INTO campaigns (id, maker_id, organization_id, title, summary, description, repo_url, funding_goal_cents, deadline_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING id as "id!: Uuid", maker_id as "maker_id!: Uuid", organization_id as "organization_id: Uuid", title, summary, description, repo_url, funding_goal_cents as "funding_goal_cents!: i64", status as "status!: CampaignStatus", deadline_at as "deadline_at: DateTime<Utc>", published_at as "published_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            maker_id,
            data.organization_id,
            data.title,
            data.summary,
            data.description,
            data.repo_url,
            data.funding_goal_cents,
            data.deadline_at
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Campaign,
            r#"SELECT id as "id!: Uuid", maker_id as "maker_id!: Uuid", organization_id as "organization_id: Uuid", title, summary, description, repo_url, funding_goal_cents as "funding_goal_cents!: i64", status as "status!: CampaignStatus", deadline_at as "deadline_at: DateTime<Utc>", published_at as "published_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM campaigns
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_with_funding(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<CampaignWithFunding>, sqlx::Error> {
        let row = sqlx::query_as!(
            CampaignFundingRow,
            r#"SELECT
  c.id                  AS "id!: Uuid",
  c.maker_id            AS "maker_id!: Uuid",
  c.organization_id     AS "organization_id: Uuid",
  c.title               AS "title!",
  c.summary,
  c.description,
  c.repo_url,
  c.funding_goal_cents  AS "funding_goal_cents!: i64",
  c.status              AS "status!: CampaignStatus",
  c.deadline_at         AS "deadline_at: DateTime<Utc>",
  c.published_at        AS "published_at: DateTime<Utc>",
  c.created_at          AS "created_at!: DateTime<Utc>",
  c.updated_at          AS "updated_at!: DateTime<Utc>",
  COALESCE(f.raised_cents, 0) AS "raised_cents!: i64",
  COALESCE(f.backer_count, 0) AS "backer_count!: i64"
FROM campaigns c
LEFT JOIN (
    SELECT campaign_id,
           SUM(amount_cents - refunded_cents) AS raised_cents,
           COUNT(DISTINCT backer_id) AS backer_count
    FROM pledges
    WHERE status = 'captured'
    GROUP BY campaign_id
) f ON f.campaign_id = c.id
WHERE c.id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await?;
        Ok(row.map(CampaignWithFunding::from))
    }

    /// Live and completed campaigns, newest first.
    pub async fn list_public(pool: &SqlitePool) -> Result<Vec<CampaignWithFunding>, sqlx::Error> {
        let rows = sqlx::query_as!(
            CampaignFundingRow,
            r#"SELECT
  c.id                  AS "id!: Uuid",
  c.maker_id            AS "maker_id!: Uuid",
  c.organization_id     AS "organization_id: Uuid",
  c.title               AS "title!",
  c.summary,
  c.description,
  c.repo_url,
  c.funding_goal_cents  AS "funding_goal_cents!: i64",
  c.status              AS "status!: CampaignStatus",
  c.deadline_at         AS "deadline_at: DateTime<Utc>",
  c.published_at        AS "published_at: DateTime<Utc>",
  c.created_at          AS "created_at!: DateTime<Utc>",
  c.updated_at          AS "updated_at!: DateTime<Utc>",
  COALESCE(f.raised_cents, 0) AS "raised_cents!: i64",
  COALESCE(f.backer_count, 0) AS "backer_count!: i64"
FROM campaigns c
LEFT JOIN (
    SELECT campaign_id,
           SUM(amount_cents - refunded_cents) AS raised_cents,
           COUNT(DISTINCT backer_id) AS backer_count
    FROM pledges
    WHERE status = 'captured'
    GROUP BY campaign_id
) f ON f.campaign_id = c.id
WHERE c.status IN ('live', 'completed')
ORDER BY c.published_at DESC, c.created_at DESC"#
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(CampaignWithFunding::from).collect())
    }

    /// Campaigns the user makes or is a team member of, in any status.
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<CampaignWithFunding>, sqlx::Error> {
        let rows = sqlx::query_as!(
            CampaignFundingRow,
            r#"SELECT
  c.id                  AS "id!: Uuid",
  c.maker_id            AS "maker_id!: Uuid",
  c.organization_id     AS "organization_id: Uuid",
  c.title               AS "title!",
  c.summary,
  c.description,
  c.repo_url,
  c.funding_goal_cents  AS "funding_goal_cents!: i64",
  c.status              AS "status!: CampaignStatus",
  c.deadline_at         AS "deadline_at: DateTime<Utc>",
  c.published_at        AS "published_at: DateTime<Utc>",
  c.created_at          AS "created_at!: DateTime<Utc>",
  c.updated_at          AS "updated_at!: DateTime<Utc>",
  COALESCE(f.raised_cents, 0) AS "raised_cents!: i64",
  COALESCE(f.backer_count, 0) AS "backer_count!: i64"
FROM campaigns c
LEFT JOIN (
    SELECT campaign_id,
           SUM(amount_cents - refunded_cents) AS raised_cents,
           COUNT(DISTINCT backer_id) AS backer_count
    FROM pledges
    WHERE status = 'captured'
    GROUP BY campaign_id
) f ON f.campaign_id = c.id
WHERE c.maker_id = $1
   OR EXISTS (SELECT 1 FROM campaign_team_members t WHERE t.campaign_id = c.id AND t.user_id = $1)
ORDER BY c.created_at DESC"#,
            user_id
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(CampaignWithFunding::from).collect())
    }

    pub async fn list_all(
        pool: &SqlitePool,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<CampaignWithFunding>, sqlx::Error> {
        let rows = sqlx::query_as!(
            CampaignFundingRow,
            r#"SELECT
  c.id                  AS "id!: Uuid",
  c.maker_id            AS "maker_id!: Uuid",
  c.organization_id     AS "organization_id: Uuid",
  c.title               AS "title!",
  c.summary,
  c.description,
  c.repo_url,
  c.funding_goal_cents  AS "funding_goal_cents!: i64",
  c.status              AS "status!: CampaignStatus",
  c.deadline_at         AS "deadline_at: DateTime<Utc>",
  c.published_at        AS "published_at: DateTime<Utc>",
  c.created_at          AS "created_at!: DateTime<Utc>",
  c.updated_at          AS "updated_at!: DateTime<Utc>",
  COALESCE(f.raised_cents, 0) AS "raised_cents!: i64",
  COALESCE(f.backer_count, 0) AS "backer_count!: i64"
FROM campaigns c
LEFT JOIN (
    SELECT campaign_id,
           SUM(amount_cents - refunded_cents) AS raised_cents,
           COUNT(DISTINCT backer_id) AS backer_count
    FROM pledges
    WHERE status = 'captured'
    GROUP BY campaign_id
) f ON f.campaign_id = c.id
WHERE $1 IS NULL OR c.status = $1
ORDER BY c.created_at DESC"#,
            status
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(CampaignWithFunding::from).collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateCampaign,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Campaign,
            r#"UPDATE campaigns
               SET title = COALESCE($2, title),
                   summary = COALESCE($3, summary),
                   description = COALESCE($4, description),
                   repo_url = COALESCE($5, repo_url),
                   funding_goal_cents = COALESCE($6, funding_goal_cents),
                   deadline_at = COALESCE($7, deadline_at),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", maker_id as "maker_id!: Uuid", organization_id as "organization_id: Uuid", title, summary, description, repo_url, funding_goal_cents as "funding_goal_cents!: i64", status as "status!: CampaignStatus", deadline_at as "deadline_at: DateTime<Utc>", published_at as "published_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.title,
            data.summary,
            data.description,
            data.repo_url,
            data.funding_goal_cents,
            data.deadline_at
        )
        .fetch_optional(pool)
        .await
    }

    /// Move to `next` only if the row is still in `current`. Returns None when
    /// another request changed the status first.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        current: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Campaign,
            r#"UPDATE campaigns
               SET status = $3,
                   published_at = CASE WHEN $3 = 'live' THEN datetime('now', 'subsec') ELSE published_at END,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = $2
               RETURNING id as "id!: Uuid", maker_id as "maker_id!: Uuid", organization_id as "organization_id: Uuid", title, summary, description, repo_url, funding_goal_cents as "funding_goal_cents!: i64", status as "status!: CampaignStatus", deadline_at as "deadline_at: DateTime<Utc>", published_at as "published_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            current,
            next
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn pledge_count(pool: &SqlitePool, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM pledges WHERE campaign_id = $1"#,
            id
        )
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM campaigns WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<CampaignStatusCount>, sqlx::Error> {
        sqlx::query_as!(
            CampaignStatusCount,
            r#"SELECT status as "status!: CampaignStatus", COUNT(*) as "count!: i64"
               FROM campaigns
               GROUP BY status
               ORDER BY status"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn is_team_member(
        pool: &SqlitePool,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM campaign_team_members WHERE campaign_id = $1 AND user_id = $2"#,
            campaign_id,
            user_id
        )
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn add_team_member(
        pool: &SqlitePool,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query!(
            "INSERT OR IGNORE INTO campaign_team_members (campaign_id, user_id) VALUES ($1, $2)",
            campaign_id,
            user_id
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_team_member(
        pool: &SqlitePool,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!(
            "DELETE FROM campaign_team_members WHERE campaign_id = $1 AND user_id = $2",
            campaign_id,
            user_id
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn team_members(
        pool: &SqlitePool,
        campaign_id: Uuid,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT u.id as "id!: Uuid", u.email as "email!", u.name, u.role as "role!: UserRole", u.created_at as "created_at!: DateTime<Utc>", u.updated_at as "updated_at!: DateTime<Utc>"
               FROM users u
               JOIN campaign_team_members t ON t.user_id = u.id
               WHERE t.campaign_id = $1
               ORDER BY t.created_at ASC"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }
}
