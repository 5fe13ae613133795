//! Role and ownership checks shared by the campaign-scoped services.

use db::models::{campaign::Campaign, user::User};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub fn require_admin(user: &User) -> Result<(), AccessError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AccessError::Forbidden("admin role required"))
    }
}

/// Maker, team member or admin.
pub async fn can_edit(pool: &SqlitePool, campaign: &Campaign, user: &User) -> Result<bool, sqlx::Error> {
    if user.is_admin() || campaign.maker_id == user.id {
        return Ok(true);
    }
    Campaign::is_team_member(pool, campaign.id, user.id).await
}

/// Public campaigns are visible to everyone, drafts and cancelled ones only to editors.
pub async fn can_view(
    pool: &SqlitePool,
    campaign: &Campaign,
    viewer: Option<&User>,
) -> Result<bool, sqlx::Error> {
    if campaign.status.is_public() {
        return Ok(true);
    }
    match viewer {
        Some(user) => can_edit(pool, campaign, user).await,
        None => Ok(false),
    }
}

pub async fn campaign_for_edit(
    pool: &SqlitePool,
    campaign_id: Uuid,
    user: &User,
) -> Result<Campaign, AccessError> {
    let campaign = Campaign::find_by_id(pool, campaign_id)
        .await?
        .ok_or(AccessError::NotFound("campaign"))?;
    if can_edit(pool, &campaign, user).await? {
        Ok(campaign)
    } else {
        Err(AccessError::Forbidden("not a member of this campaign"))
    }
}

/// Hidden campaigns read as missing rather than forbidden.
pub async fn campaign_for_view(
    pool: &SqlitePool,
    campaign_id: Uuid,
    viewer: Option<&User>,
) -> Result<Campaign, AccessError> {
    let campaign = Campaign::find_by_id(pool, campaign_id)
        .await?
        .ok_or(AccessError::NotFound("campaign"))?;
    if can_view(pool, &campaign, viewer).await? {
        Ok(campaign)
    } else {
        Err(AccessError::NotFound("campaign"))
    }
}
