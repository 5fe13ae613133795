//! Campaign lifecycle, team management and backer updates.

use std::sync::Arc;

use db::models::{
    campaign::{Campaign, CampaignStatus, CampaignWithFunding, CreateCampaign, UpdateCampaign},
    campaign_update::{CampaignUpdate, CreateCampaignUpdate},
    milestone::Milestone,
    organization::Organization,
    pledge_tier::PledgeTier,
    stretch_goal::{StretchGoal, StretchGoalProgress},
    user::User,
    user_settings::UserSettings,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::text::normalize_email;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    email::{EmailSender, send_best_effort},
    email_templates,
    validation::{ValidationErrors, required_text},
};

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum CampaignServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("cannot {action} a {status} campaign")]
    InvalidTransition {
        action: CampaignAction,
        status: CampaignStatus,
    },
    #[error("campaign has pledges and cannot be deleted")]
    HasPledges,
    #[error("user not found")]
    UserNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignAction {
    Publish,
    Complete,
    Cancel,
}

impl CampaignAction {
    pub fn target(self) -> CampaignStatus {
        match self {
            CampaignAction::Publish => CampaignStatus::Live,
            CampaignAction::Complete => CampaignStatus::Completed,
            CampaignAction::Cancel => CampaignStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct FundingSummary {
    pub goal_cents: i64,
    pub raised_cents: i64,
    pub backer_count: i64,
    pub percent_funded: i64,
}

impl FundingSummary {
    pub fn new(goal_cents: i64, raised_cents: i64, backer_count: i64) -> Self {
        let percent_funded = if goal_cents > 0 {
            raised_cents * 100 / goal_cents
        } else {
            0
        };
        Self {
            goal_cents,
            raised_cents,
            backer_count,
            percent_funded,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub funding: FundingSummary,
    pub milestones: Vec<Milestone>,
    pub pledge_tiers: Vec<PledgeTier>,
    pub stretch_goals: Vec<StretchGoalProgress>,
    pub team: Vec<User>,
    pub can_edit: bool,
}

pub struct CampaignService {
    pool: SqlitePool,
    email: Arc<dyn EmailSender>,
    app_base_url: String,
}

impl CampaignService {
    pub fn new(pool: SqlitePool, email: Arc<dyn EmailSender>, app_base_url: String) -> Self {
        Self {
            pool,
            email,
            app_base_url,
        }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        mine: bool,
    ) -> Result<Vec<CampaignWithFunding>, CampaignServiceError> {
        let campaigns = match (viewer, mine) {
            (Some(user), true) => Campaign::list_for_user(&self.pool, user.id).await?,
            _ => Campaign::list_public(&self.pool).await?,
        };
        Ok(campaigns)
    }

    pub async fn get(
        &self,
        campaign_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<CampaignDetail, CampaignServiceError> {
        let campaign = access::campaign_for_view(&self.pool, campaign_id, viewer).await?;
        let can_edit = match viewer {
            Some(user) => access::can_edit(&self.pool, &campaign, user).await?,
            None => false,
        };
        let funded = Campaign::find_with_funding(&self.pool, campaign_id)
            .await?
            .ok_or(AccessError::NotFound("campaign"))?;

        let stretch_goals = StretchGoal::find_by_campaign(&self.pool, campaign_id)
            .await?
            .into_iter()
            .map(|goal| goal.with_progress(funded.raised_cents))
            .collect();

        Ok(CampaignDetail {
            funding: FundingSummary::new(
                campaign.funding_goal_cents,
                funded.raised_cents,
                funded.backer_count,
            ),
            milestones: Milestone::find_by_campaign(&self.pool, campaign_id).await?,
            pledge_tiers: PledgeTier::find_by_campaign(&self.pool, campaign_id, !can_edit).await?,
            stretch_goals,
            team: Campaign::team_members(&self.pool, campaign_id).await?,
            can_edit,
            campaign,
        })
    }

    pub async fn create(
        &self,
        user: &User,
        data: &CreateCampaign,
    ) -> Result<Campaign, CampaignServiceError> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "title", &data.title, MAX_TITLE_LEN);
        errors.check(
            data.funding_goal_cents > 0,
            "funding_goal_cents",
            "must be greater than zero",
        );
        errors.into_result()?;

        if let Some(org_id) = data.organization_id {
            let organization = Organization::find_by_id(&self.pool, org_id)
                .await?
                .ok_or(AccessError::NotFound("organization"))?;
            if organization.owner_id != user.id {
                return Err(AccessError::Forbidden("not the owner of this organization").into());
            }
        }

        let mut data = data.clone();
        data.title = data.title.trim().to_string();
        let campaign = Campaign::create(&self.pool, Uuid::new_v4(), user.id, &data).await?;
        info!(campaign_id = %campaign.id, maker_id = %user.id, "Campaign created");
        Ok(campaign)
    }

    pub async fn update(
        &self,
        user: &User,
        campaign_id: Uuid,
        data: &UpdateCampaign,
    ) -> Result<Campaign, CampaignServiceError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;

        let mut errors = ValidationErrors::new();
        if let Some(title) = &data.title {
            required_text(&mut errors, "title", title, MAX_TITLE_LEN);
        }
        if let Some(goal) = data.funding_goal_cents {
            errors.check(goal > 0, "funding_goal_cents", "must be greater than zero");
        }
        errors.into_result()?;

        Campaign::update(&self.pool, campaign_id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("campaign").into())
    }

    pub async fn transition(
        &self,
        user: &User,
        campaign_id: Uuid,
        action: CampaignAction,
    ) -> Result<Campaign, CampaignServiceError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let next = action.target();
        if !campaign.status.can_transition_to(next) {
            return Err(CampaignServiceError::InvalidTransition {
                action,
                status: campaign.status,
            });
        }

        if action == CampaignAction::Publish {
            let milestones = Milestone::find_by_campaign(&self.pool, campaign_id).await?;
            if milestones.is_empty() {
                return Err(ValidationErrors::single(
                    "milestones",
                    "at least one milestone is required to publish",
                )
                .into());
            }
            let total: i64 = milestones.iter().map(|m| m.pct).sum();
            if total != 100 {
                return Err(ValidationErrors::single(
                    "milestones",
                    format!("milestone percentages must total 100 to publish (currently {total})"),
                )
                .into());
            }
        }

        // A concurrent transition makes the guarded update miss
        let updated = Campaign::update_status(&self.pool, campaign_id, campaign.status, next)
            .await?
            .ok_or(CampaignServiceError::InvalidTransition {
                action,
                status: campaign.status,
            })?;
        info!(
            campaign_id = %campaign_id,
            from = %campaign.status,
            to = %next,
            actor = %user.id,
            "Campaign status changed"
        );
        Ok(updated)
    }

    pub async fn delete(&self, user: &User, campaign_id: Uuid) -> Result<(), CampaignServiceError> {
        access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        if Campaign::pledge_count(&self.pool, campaign_id).await? > 0 {
            return Err(CampaignServiceError::HasPledges);
        }
        Campaign::delete(&self.pool, campaign_id).await?;
        info!(campaign_id = %campaign_id, actor = %user.id, "Campaign deleted");
        Ok(())
    }

    /// Team changes are limited to the maker and admins.
    async fn campaign_for_team_change(
        &self,
        user: &User,
        campaign_id: Uuid,
    ) -> Result<Campaign, CampaignServiceError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        if campaign.maker_id != user.id && !user.is_admin() {
            return Err(AccessError::Forbidden("only the maker can manage the team").into());
        }
        Ok(campaign)
    }

    pub async fn add_team_member(
        &self,
        user: &User,
        campaign_id: Uuid,
        email: &str,
    ) -> Result<Vec<User>, CampaignServiceError> {
        let campaign = self.campaign_for_team_change(user, campaign_id).await?;
        let member = User::find_by_email(&self.pool, &normalize_email(email))
            .await?
            .ok_or(CampaignServiceError::UserNotFound)?;
        if member.id == campaign.maker_id {
            return Err(ValidationErrors::single("email", "the maker is already on the team").into());
        }
        if Campaign::add_team_member(&self.pool, campaign_id, member.id).await? {
            info!(campaign_id = %campaign_id, member_id = %member.id, "Team member added");
        }
        Ok(Campaign::team_members(&self.pool, campaign_id).await?)
    }

    pub async fn remove_team_member(
        &self,
        user: &User,
        campaign_id: Uuid,
        member_id: Uuid,
    ) -> Result<Vec<User>, CampaignServiceError> {
        self.campaign_for_team_change(user, campaign_id).await?;
        if Campaign::remove_team_member(&self.pool, campaign_id, member_id).await? == 0 {
            return Err(CampaignServiceError::UserNotFound);
        }
        Ok(Campaign::team_members(&self.pool, campaign_id).await?)
    }

    /// Store an update and email opted-in backers. Delivery failures are logged only.
    pub async fn post_update(
        &self,
        user: &User,
        campaign_id: Uuid,
        data: &CreateCampaignUpdate,
    ) -> Result<CampaignUpdate, CampaignServiceError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;

        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "title", &data.title, MAX_TITLE_LEN);
        required_text(&mut errors, "content", &data.content, 50_000);
        errors.into_result()?;

        let update =
            CampaignUpdate::create(&self.pool, Uuid::new_v4(), campaign_id, user.id, data).await?;

        let recipients = UserSettings::campaign_update_recipients(&self.pool, campaign_id).await?;
        let url = format!("{}/campaigns/{}", self.app_base_url, campaign_id);
        for recipient in &recipients {
            let message =
                email_templates::campaign_update(&campaign.title, &update.title, &update.content, &url)
                    .to(&recipient.email);
            send_best_effort(self.email.as_ref(), message).await;
        }
        info!(
            campaign_id = %campaign_id,
            update_id = %update.id,
            recipients = recipients.len(),
            "Campaign update posted"
        );
        Ok(update)
    }

    pub async fn list_updates(
        &self,
        campaign_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Vec<CampaignUpdate>, CampaignServiceError> {
        access::campaign_for_view(&self.pool, campaign_id, viewer).await?;
        Ok(CampaignUpdate::find_by_campaign(&self.pool, campaign_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        milestone::CreateMilestone,
        pledge::{CreatePledge, Pledge},
        user_settings::UpdateUserSettings,
    };

    use super::*;
    use crate::services::test_support::{self, RecordingEmail};

    fn service(db: &db::DBService, email: Arc<RecordingEmail>) -> CampaignService {
        CampaignService::new(db.pool.clone(), email, "https://app".to_string())
    }

    fn new_campaign(title: &str, goal: i64) -> CreateCampaign {
        CreateCampaign {
            title: title.to_string(),
            summary: None,
            description: None,
            repo_url: None,
            funding_goal_cents: goal,
            deadline_at: None,
            organization_id: None,
        }
    }

    async fn add_milestone(db: &db::DBService, campaign_id: Uuid, pct: i64) {
        Milestone::create(
            &db.pool,
            Uuid::new_v4(),
            campaign_id,
            &CreateMilestone {
                name: format!("{pct}% milestone"),
                description: None,
                pct,
                position: None,
                acceptance_criteria: None,
            },
        )
        .await
        .unwrap();
    }

    async fn captured_pledge(db: &db::DBService, campaign_id: Uuid, backer: &User, amount: i64) -> Pledge {
        let (pledge, _) = Pledge::create_from_checkout(
            &db.pool,
            Uuid::new_v4(),
            &CreatePledge {
                campaign_id,
                backer_id: backer.id,
                pledge_tier_id: None,
                amount_cents: amount,
                currency: "usd".to_string(),
                checkout_session_id: format!("cs_{}", Uuid::new_v4()),
                payment_intent_id: Some(format!("pi_{}", Uuid::new_v4())),
            },
        )
        .await
        .unwrap();
        Pledge::capture(&db.pool, pledge.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn create_validates_input() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let svc = service(&db, Arc::new(RecordingEmail::default()));

        let err = svc.create(&maker, &new_campaign("  ", 0)).await.unwrap_err();
        let CampaignServiceError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.fields.contains_key("title"));
        assert!(errors.fields.contains_key("funding_goal_cents"));

        let campaign = svc.create(&maker, &new_campaign(" SOC 2 readiness ", 500_000)).await.unwrap();
        assert_eq!(campaign.title, "SOC 2 readiness");
        assert_eq!(campaign.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn publish_requires_milestones_totalling_100() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let svc = service(&db, Arc::new(RecordingEmail::default()));
        let campaign = svc.create(&maker, &new_campaign("Audit logs", 100_000)).await.unwrap();

        assert!(matches!(
            svc.transition(&maker, campaign.id, CampaignAction::Publish).await,
            Err(CampaignServiceError::Validation(_))
        ));
        add_milestone(&db, campaign.id, 60).await;
        assert!(matches!(
            svc.transition(&maker, campaign.id, CampaignAction::Publish).await,
            Err(CampaignServiceError::Validation(_))
        ));
        add_milestone(&db, campaign.id, 40).await;

        let live = svc
            .transition(&maker, campaign.id, CampaignAction::Publish)
            .await
            .unwrap();
        assert_eq!(live.status, CampaignStatus::Live);
        assert!(live.published_at.is_some());

        // live -> live is not a transition
        assert!(matches!(
            svc.transition(&maker, campaign.id, CampaignAction::Publish).await,
            Err(CampaignServiceError::InvalidTransition { .. })
        ));
        let done = svc
            .transition(&maker, campaign.id, CampaignAction::Complete)
            .await
            .unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
        assert!(matches!(
            svc.transition(&maker, campaign.id, CampaignAction::Cancel).await,
            Err(CampaignServiceError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn strangers_cannot_edit_and_pledged_campaigns_cannot_be_deleted() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let stranger = test_support::user(&db, "stranger@example.com").await;
        let backer = test_support::user(&db, "backer@example.com").await;
        let svc = service(&db, Arc::new(RecordingEmail::default()));
        let campaign = test_support::live_campaign(&db, &maker, 100_000).await;

        assert!(matches!(
            svc.update(&stranger, campaign.id, &UpdateCampaign::default()).await,
            Err(CampaignServiceError::Access(AccessError::Forbidden(_)))
        ));

        captured_pledge(&db, campaign.id, &backer, 5_000).await;
        assert!(matches!(
            svc.delete(&maker, campaign.id).await,
            Err(CampaignServiceError::HasPledges)
        ));

        let draft = test_support::draft_campaign(&db, &maker, 1_000).await;
        svc.delete(&maker, draft.id).await.unwrap();
        assert!(Campaign::find_by_id(&db.pool, draft.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn team_is_managed_by_maker_only() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let teammate = test_support::user(&db, "team@example.com").await;
        let other = test_support::user(&db, "other@example.com").await;
        let svc = service(&db, Arc::new(RecordingEmail::default()));
        let campaign = test_support::draft_campaign(&db, &maker, 1_000).await;

        let team = svc.add_team_member(&maker, campaign.id, "Team@Example.com").await.unwrap();
        assert_eq!(team.len(), 1);

        // Team members can edit but not manage the team
        assert!(svc.update(&teammate, campaign.id, &UpdateCampaign::default()).await.is_ok());
        assert!(matches!(
            svc.add_team_member(&teammate, campaign.id, "other@example.com").await,
            Err(CampaignServiceError::Access(AccessError::Forbidden(_)))
        ));
        assert!(matches!(
            svc.add_team_member(&maker, campaign.id, "nobody@example.com").await,
            Err(CampaignServiceError::UserNotFound)
        ));

        let team = svc.remove_team_member(&maker, campaign.id, teammate.id).await.unwrap();
        assert!(team.is_empty());
        assert!(matches!(
            svc.remove_team_member(&maker, campaign.id, other.id).await,
            Err(CampaignServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn updates_reach_opted_in_backers() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let keen = test_support::user(&db, "keen@example.com").await;
        let quiet = test_support::user(&db, "quiet@example.com").await;
        let email = Arc::new(RecordingEmail::default());
        let svc = service(&db, email.clone());
        let campaign = test_support::live_campaign(&db, &maker, 100_000).await;
        captured_pledge(&db, campaign.id, &keen, 5_000).await;
        captured_pledge(&db, campaign.id, &quiet, 5_000).await;
        UserSettings::update(
            &db.pool,
            quiet.id,
            &UpdateUserSettings {
                email_on_campaign_update: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        svc.post_update(
            &maker,
            campaign.id,
            &CreateCampaignUpdate {
                title: "SSO shipped".to_string(),
                content: "SAML and OIDC are live.".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(email.sent_to("keen@example.com").len(), 1);
        assert!(email.sent_to("quiet@example.com").is_empty());
        assert_eq!(svc.list_updates(campaign.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detail_reports_funding_and_stretch_progress() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let backer = test_support::user(&db, "backer@example.com").await;
        let svc = service(&db, Arc::new(RecordingEmail::default()));
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        captured_pledge(&db, campaign.id, &backer, 12_500).await;
        StretchGoal::create(
            &db.pool,
            Uuid::new_v4(),
            campaign.id,
            &db::models::stretch_goal::CreateStretchGoal {
                title: "Mobile SDK".to_string(),
                description: None,
                target_cents: 12_000,
                position: None,
            },
        )
        .await
        .unwrap();

        let detail = svc.get(campaign.id, None).await.unwrap();
        assert_eq!(detail.funding.raised_cents, 12_500);
        assert_eq!(detail.funding.percent_funded, 125);
        assert_eq!(detail.funding.backer_count, 1);
        assert!(detail.stretch_goals[0].reached);
        assert!(!detail.can_edit);
        assert!(svc.get(campaign.id, Some(&maker)).await.unwrap().can_edit);
    }
}
