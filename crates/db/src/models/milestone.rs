use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Review state of a milestone. Funds for the milestone are released on acceptance.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "milestone_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MilestoneStatus {
    #[default]
    Pending,
    Submitted,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Milestone {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub pct: i64, // share of net funds released on acceptance, 1..=100
    pub position: i64,
    pub acceptance_criteria: Option<String>,
    pub status: MilestoneStatus,
    pub evidence: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub review_deadline_at: Option<DateTime<Utc>>, // auto-accepted after this if still submitted
    pub decided_at: Option<DateTime<Utc>>,
    pub released_cents: i64,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateMilestone {
    pub name: String,
    pub description: Option<String>,
    pub pct: i64,
    pub position: Option<i64>,
    pub acceptance_criteria: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateMilestone {
    pub name: Option<String>,
    pub description: Option<String>,
    pub pct: Option<i64>,
    pub position: Option<i64>,
    pub acceptance_criteria: Option<String>,
}

impl Milestone {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        campaign_id: Uuid,
        data: &CreateMilestone,
    ) -> Result<Self, sqlx::Error> {
        // Append after the last milestone unless a position is given
        sqlx::query_as!(
            Milestone,
            r#"INSERT INTO milestones (id, campaign_id, name, description, pct, position, acceptance_criteria)
               VALUES ($1, $2, $3, $4, $5,
                       COALESCE($6, (SELECT COALESCE(MAX(position), 0) + 1 FROM milestones WHERE campaign_id = $2)),
                       $7)
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            campaign_id,
            data.name,
            data.description,
            data.pct,
            data.position,
            data.acceptance_criteria
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Milestone,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM milestones
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
            Milestone,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM milestones
               WHERE campaign_id = $1
               ORDER BY position ASC, created_at ASC"#,
            campaign_id
        )
        .fetch_all(pool)
        .await
    }

    /// Sum of milestone percentages for a campaign, optionally ignoring one milestone.
    pub async fn pct_total(
        pool: &SqlitePool,
        campaign_id: Uuid,
        excluding: Option<Uuid>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COALESCE(SUM(pct), 0) as "total!: i64" FROM milestones
               WHERE campaign_id = $1 AND ($2 IS NULL OR id != $2)"#,
            campaign_id,
            excluding
        )
        .fetch_one(pool)
        .await
    }

    /// Milestones ordered before `position` that are not yet accepted.
    pub async fn count_unaccepted_before(
        pool: &SqlitePool,
        campaign_id: Uuid,
        position: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM milestones
               WHERE campaign_id = $1 AND position < $2 AND status != 'accepted'"#,
            campaign_id,
            position
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateMilestone,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Milestone,
            r#"UPDATE milestones
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   pct = COALESCE($4, pct),
                   position = COALESCE($5, position),
                   acceptance_criteria = COALESCE($6, acceptance_criteria),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.name,
            data.description,
            data.pct,
            data.position,
            data.acceptance_criteria
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM milestones WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// pending|rejected -> submitted, opening a review window of `review_days`.
    pub async fn submit(
        pool: &SqlitePool,
        id: Uuid,
        evidence: &str,
        review_days: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let window = format!("{:+} days", review_days);
        sqlx::query_as!(
            Milestone,
            r#"UPDATE milestones
               SET status = 'submitted',
                   evidence = $2,
                   submitted_at = datetime('now', 'subsec'),
                   review_deadline_at = datetime('now', 'subsec', $3),
                   rejection_reason = NULL,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status IN ('pending', 'rejected')
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            evidence,
            window
        )
        .fetch_optional(pool)
        .await
    }

    /// Record the review outcome. Only applies while the milestone is submitted.
    pub async fn decide(
        pool: &SqlitePool,
        id: Uuid,
        status: MilestoneStatus,
        released_cents: i64,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Milestone,
            r#"UPDATE milestones
               SET status = $2,
                   released_cents = $3,
                   rejection_reason = $4,
                   decided_at = datetime('now', 'subsec'),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'submitted'
               RETURNING id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            status,
            released_cents,
            rejection_reason
        )
        .fetch_optional(pool)
        .await
    }

    /// Submitted milestones whose review window has closed.
    pub async fn find_review_overdue(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Milestone,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM milestones
               WHERE status = 'submitted'
                 AND review_deadline_at IS NOT NULL
                 AND datetime(review_deadline_at) <= datetime('now')
               ORDER BY review_deadline_at ASC"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_submitted(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Milestone,
            r#"SELECT id as "id!: Uuid", campaign_id as "campaign_id!: Uuid", name, description, pct as "pct!: i64", position as "position!: i64", acceptance_criteria, status as "status!: MilestoneStatus", evidence, submitted_at as "submitted_at: DateTime<Utc>", review_deadline_at as "review_deadline_at: DateTime<Utc>", decided_at as "decided_at: DateTime<Utc>", released_cents as "released_cents!: i64", rejection_reason, created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM milestones
               WHERE status = 'submitted'
               ORDER BY submitted_at ASC"#
        )
        .fetch_all(pool)
        .await
    }
}
