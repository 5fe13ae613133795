//! Pledge tiers and stretch goals attached to a campaign.

use db::models::{
    campaign::Campaign,
    pledge_tier::{CreatePledgeTier, PledgeTier, UpdatePledgeTier},
    stretch_goal::{CreateStretchGoal, StretchGoal, StretchGoalProgress, UpdateStretchGoal},
    user::User,
};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    validation::{ValidationErrors, required_text},
};

#[derive(Debug, Error)]
pub enum RewardError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn check_amount(errors: &mut ValidationErrors, field: &str, amount: Option<i64>) {
    if let Some(amount) = amount {
        errors.check(amount > 0, field, "must be greater than zero");
    }
}

pub struct RewardService {
    pool: SqlitePool,
}

impl RewardService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Editors also see deactivated tiers.
    pub async fn list_tiers(
        &self,
        campaign_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Vec<PledgeTier>, RewardError> {
        let campaign = access::campaign_for_view(&self.pool, campaign_id, viewer).await?;
        let editor = match viewer {
            Some(user) => access::can_edit(&self.pool, &campaign, user).await?,
            None => false,
        };
        Ok(PledgeTier::find_by_campaign(&self.pool, campaign_id, !editor).await?)
    }

    pub async fn create_tier(
        &self,
        user: &User,
        campaign_id: Uuid,
        data: &CreatePledgeTier,
    ) -> Result<PledgeTier, RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "title", &data.title, 200);
        check_amount(&mut errors, "amount_cents", Some(data.amount_cents));
        errors.into_result()?;
        Ok(PledgeTier::create(&self.pool, Uuid::new_v4(), campaign_id, data).await?)
    }

    async fn tier_in(&self, campaign_id: Uuid, tier_id: Uuid) -> Result<PledgeTier, RewardError> {
        PledgeTier::find_by_id(&self.pool, tier_id)
            .await?
            .filter(|t| t.campaign_id == campaign_id)
            .ok_or_else(|| AccessError::NotFound("pledge tier").into())
    }

    pub async fn update_tier(
        &self,
        user: &User,
        campaign_id: Uuid,
        tier_id: Uuid,
        data: &UpdatePledgeTier,
    ) -> Result<PledgeTier, RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        self.tier_in(campaign_id, tier_id).await?;
        let mut errors = ValidationErrors::new();
        if let Some(title) = &data.title {
            required_text(&mut errors, "title", title, 200);
        }
        check_amount(&mut errors, "amount_cents", data.amount_cents);
        errors.into_result()?;

        PledgeTier::update(&self.pool, tier_id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("pledge tier").into())
    }

    pub async fn delete_tier(&self, user: &User, campaign_id: Uuid, tier_id: Uuid) -> Result<(), RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        self.tier_in(campaign_id, tier_id).await?;
        PledgeTier::delete(&self.pool, tier_id).await?;
        Ok(())
    }

    pub async fn list_stretch_goals(
        &self,
        campaign_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Vec<StretchGoalProgress>, RewardError> {
        access::campaign_for_view(&self.pool, campaign_id, viewer).await?;
        let raised = Campaign::find_with_funding(&self.pool, campaign_id)
            .await?
            .map(|c| c.raised_cents)
            .unwrap_or(0);
        Ok(StretchGoal::find_by_campaign(&self.pool, campaign_id)
            .await?
            .into_iter()
            .map(|goal| goal.with_progress(raised))
            .collect())
    }

    pub async fn create_stretch_goal(
        &self,
        user: &User,
        campaign_id: Uuid,
        data: &CreateStretchGoal,
    ) -> Result<StretchGoal, RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "title", &data.title, 200);
        check_amount(&mut errors, "target_cents", Some(data.target_cents));
        errors.into_result()?;
        Ok(StretchGoal::create(&self.pool, Uuid::new_v4(), campaign_id, data).await?)
    }

    async fn goal_in(&self, campaign_id: Uuid, goal_id: Uuid) -> Result<StretchGoal, RewardError> {
        StretchGoal::find_by_id(&self.pool, goal_id)
            .await?
            .filter(|g| g.campaign_id == campaign_id)
            .ok_or_else(|| AccessError::NotFound("stretch goal").into())
    }

    pub async fn update_stretch_goal(
        &self,
        user: &User,
        campaign_id: Uuid,
        goal_id: Uuid,
        data: &UpdateStretchGoal,
    ) -> Result<StretchGoal, RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        self.goal_in(campaign_id, goal_id).await?;
        let mut errors = ValidationErrors::new();
        if let Some(title) = &data.title {
            required_text(&mut errors, "title", title, 200);
        }
        check_amount(&mut errors, "target_cents", data.target_cents);
        errors.into_result()?;

        StretchGoal::update(&self.pool, goal_id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("stretch goal").into())
    }

    pub async fn delete_stretch_goal(
        &self,
        user: &User,
        campaign_id: Uuid,
        goal_id: Uuid,
    ) -> Result<(), RewardError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        self.goal_in(campaign_id, goal_id).await?;
        StretchGoal::delete(&self.pool, goal_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;

    fn tier(amount: i64) -> CreatePledgeTier {
        CreatePledgeTier {
            title: "Early backer".to_string(),
            description: None,
            amount_cents: amount,
            position: None,
        }
    }

    #[tokio::test]
    async fn inactive_tiers_visible_to_editors_only() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        let svc = RewardService::new(db.pool.clone());

        assert!(matches!(
            svc.create_tier(&maker, campaign.id, &tier(0)).await,
            Err(RewardError::Validation(_))
        ));
        let created = svc.create_tier(&maker, campaign.id, &tier(2_500)).await.unwrap();
        svc.update_tier(
            &maker,
            campaign.id,
            created.id,
            &UpdatePledgeTier {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(svc.list_tiers(campaign.id, None).await.unwrap().is_empty());
        assert_eq!(svc.list_tiers(campaign.id, Some(&maker)).await.unwrap().len(), 1);

        let other = test_support::live_campaign(&db, &maker, 10_000).await;
        assert!(matches!(
            svc.delete_tier(&maker, other.id, created.id).await,
            Err(RewardError::Access(AccessError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn stretch_goals_report_progress() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let stranger = test_support::user(&db, "stranger@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        let svc = RewardService::new(db.pool.clone());
        let data = CreateStretchGoal {
            title: "Windows support".to_string(),
            description: None,
            target_cents: 20_000,
            position: None,
        };

        assert!(matches!(
            svc.create_stretch_goal(&stranger, campaign.id, &data).await,
            Err(RewardError::Access(AccessError::Forbidden(_)))
        ));
        svc.create_stretch_goal(&maker, campaign.id, &data).await.unwrap();

        let goals = svc.list_stretch_goals(campaign.id, None).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert!(!goals[0].reached);
    }
}
