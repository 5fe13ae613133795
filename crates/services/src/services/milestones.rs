//! Milestone planning and the submit/review cycle that releases funds.

use db::models::{
    campaign::{Campaign, CampaignStatus},
    milestone::{CreateMilestone, Milestone, MilestoneStatus, UpdateMilestone},
    user::User,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    validation::{ValidationErrors, required_text},
};

#[derive(Debug, Error)]
pub enum MilestoneError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("milestone is {0}")]
    InvalidState(MilestoneStatus),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SubmitMilestone {
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RejectMilestone {
    pub reason: String,
}

/// Funds released for a milestone, floored to whole cents.
pub fn release_amount(net_raised_cents: i64, pct: i64) -> i64 {
    net_raised_cents.max(0) * pct / 100
}

fn check_pct(errors: &mut ValidationErrors, pct: i64, others: i64) {
    if !(1..=100).contains(&pct) {
        errors.add("pct", "must be between 1 and 100");
    } else if others + pct > 100 {
        errors.add(
            "pct",
            format!("milestone percentages would total {}, the maximum is 100", others + pct),
        );
    }
}

pub struct MilestoneService {
    pool: SqlitePool,
    review_days: i64,
}

impl MilestoneService {
    pub fn new(pool: SqlitePool, review_days: i64) -> Self {
        Self { pool, review_days }
    }

    async fn milestone_in(&self, campaign_id: Uuid, milestone_id: Uuid) -> Result<Milestone, MilestoneError> {
        Milestone::find_by_id(&self.pool, milestone_id)
            .await?
            .filter(|m| m.campaign_id == campaign_id)
            .ok_or_else(|| AccessError::NotFound("milestone").into())
    }

    pub async fn list(
        &self,
        campaign_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Vec<Milestone>, MilestoneError> {
        access::campaign_for_view(&self.pool, campaign_id, viewer).await?;
        Ok(Milestone::find_by_campaign(&self.pool, campaign_id).await?)
    }

    pub async fn create(
        &self,
        user: &User,
        campaign_id: Uuid,
        data: &CreateMilestone,
    ) -> Result<Milestone, MilestoneError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Live) {
            return Err(ValidationErrors::single(
                "campaign",
                format!("cannot add milestones to a {} campaign", campaign.status),
            )
            .into());
        }

        let others = Milestone::pct_total(&self.pool, campaign_id, None).await?;
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "name", &data.name, 200);
        check_pct(&mut errors, data.pct, others);
        errors.into_result()?;

        let milestone = Milestone::create(&self.pool, Uuid::new_v4(), campaign_id, data).await?;
        info!(campaign_id = %campaign_id, milestone_id = %milestone.id, pct = milestone.pct, "Milestone created");
        Ok(milestone)
    }

    pub async fn update(
        &self,
        user: &User,
        campaign_id: Uuid,
        milestone_id: Uuid,
        data: &UpdateMilestone,
    ) -> Result<Milestone, MilestoneError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let milestone = self.milestone_in(campaign_id, milestone_id).await?;

        let mut errors = ValidationErrors::new();
        if let Some(name) = &data.name {
            required_text(&mut errors, "name", name, 200);
        }
        if let Some(pct) = data.pct {
            if pct != milestone.pct {
                if campaign.status != CampaignStatus::Draft {
                    errors.add("pct", "cannot change once the campaign is published");
                } else {
                    let others = Milestone::pct_total(&self.pool, campaign_id, Some(milestone_id)).await?;
                    check_pct(&mut errors, pct, others);
                }
            }
        }
        // Release order follows position, so it is fixed once backers can pledge
        if let Some(position) = data.position {
            if position != milestone.position && campaign.status != CampaignStatus::Draft {
                errors.add("position", "cannot change once the campaign is published");
            }
        }
        errors.into_result()?;

        Milestone::update(&self.pool, milestone_id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("milestone").into())
    }

    pub async fn delete(
        &self,
        user: &User,
        campaign_id: Uuid,
        milestone_id: Uuid,
    ) -> Result<(), MilestoneError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let milestone = self.milestone_in(campaign_id, milestone_id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(ValidationErrors::single(
                "campaign",
                "milestones cannot be removed once the campaign is published",
            )
            .into());
        }
        if milestone.status != MilestoneStatus::Pending {
            return Err(MilestoneError::InvalidState(milestone.status));
        }
        Milestone::delete(&self.pool, milestone_id).await?;
        Ok(())
    }

    /// Earlier milestones must be accepted before a later one goes to review.
    pub async fn submit(
        &self,
        user: &User,
        campaign_id: Uuid,
        milestone_id: Uuid,
        data: &SubmitMilestone,
    ) -> Result<Milestone, MilestoneError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let milestone = self.milestone_in(campaign_id, milestone_id).await?;

        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "evidence", &data.evidence, 20_000);
        errors.check(
            matches!(campaign.status, CampaignStatus::Live | CampaignStatus::Completed),
            "campaign",
            "milestones can only be submitted on a published campaign",
        );
        errors.into_result()?;

        if !matches!(milestone.status, MilestoneStatus::Pending | MilestoneStatus::Rejected) {
            return Err(MilestoneError::InvalidState(milestone.status));
        }
        if Milestone::count_unaccepted_before(&self.pool, campaign_id, milestone.position).await? > 0 {
            return Err(ValidationErrors::single(
                "milestone",
                "earlier milestones must be accepted first",
            )
            .into());
        }

        let submitted = Milestone::submit(&self.pool, milestone_id, data.evidence.trim(), self.review_days)
            .await?
            .ok_or(MilestoneError::InvalidState(milestone.status))?;
        info!(
            campaign_id = %campaign_id,
            milestone_id = %milestone_id,
            review_days = self.review_days,
            "Milestone submitted for review"
        );
        Ok(submitted)
    }

    async fn net_raised(&self, campaign_id: Uuid) -> Result<i64, MilestoneError> {
        Ok(Campaign::find_with_funding(&self.pool, campaign_id)
            .await?
            .map(|c| c.raised_cents)
            .unwrap_or(0))
    }

    async fn accept_milestone(&self, milestone: &Milestone) -> Result<Option<Milestone>, MilestoneError> {
        let released = release_amount(self.net_raised(milestone.campaign_id).await?, milestone.pct);
        Ok(Milestone::decide(&self.pool, milestone.id, MilestoneStatus::Accepted, released, None).await?)
    }

    pub async fn accept(
        &self,
        admin: &User,
        campaign_id: Uuid,
        milestone_id: Uuid,
    ) -> Result<Milestone, MilestoneError> {
        access::require_admin(admin)?;
        let milestone = self.milestone_in(campaign_id, milestone_id).await?;
        if milestone.status != MilestoneStatus::Submitted {
            return Err(MilestoneError::InvalidState(milestone.status));
        }
        let accepted = self
            .accept_milestone(&milestone)
            .await?
            .ok_or(MilestoneError::InvalidState(milestone.status))?;
        info!(
            milestone_id = %milestone_id,
            released_cents = accepted.released_cents,
            admin_id = %admin.id,
            "Milestone accepted"
        );
        Ok(accepted)
    }

    pub async fn reject(
        &self,
        admin: &User,
        campaign_id: Uuid,
        milestone_id: Uuid,
        data: &RejectMilestone,
    ) -> Result<Milestone, MilestoneError> {
        access::require_admin(admin)?;
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "reason", &data.reason, 2_000);
        errors.into_result()?;

        let milestone = self.milestone_in(campaign_id, milestone_id).await?;
        if milestone.status != MilestoneStatus::Submitted {
            return Err(MilestoneError::InvalidState(milestone.status));
        }
        let rejected = Milestone::decide(
            &self.pool,
            milestone_id,
            MilestoneStatus::Rejected,
            0,
            Some(data.reason.trim()),
        )
        .await?
        .ok_or(MilestoneError::InvalidState(milestone.status))?;
        info!(milestone_id = %milestone_id, admin_id = %admin.id, "Milestone rejected");
        Ok(rejected)
    }

    pub async fn list_submitted(&self, admin: &User) -> Result<Vec<Milestone>, MilestoneError> {
        access::require_admin(admin)?;
        Ok(Milestone::find_submitted(&self.pool).await?)
    }

    /// Accept every submitted milestone whose review window has closed.
    pub async fn accept_overdue(&self) -> Result<usize, MilestoneError> {
        let overdue = Milestone::find_review_overdue(&self.pool).await?;
        let mut accepted = 0;
        for milestone in overdue {
            match self.accept_milestone(&milestone).await {
                Ok(Some(m)) => {
                    accepted += 1;
                    info!(
                        milestone_id = %m.id,
                        campaign_id = %m.campaign_id,
                        released_cents = m.released_cents,
                        "Milestone auto-accepted after review window"
                    );
                }
                // Decided by an admin in the meantime
                Ok(None) => {}
                Err(e) => warn!(milestone_id = %milestone.id, error = %e, "Failed to auto-accept milestone"),
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use db::models::pledge::{CreatePledge, Pledge};

    use super::*;
    use crate::services::test_support;

    fn new_milestone(name: &str, pct: i64) -> CreateMilestone {
        CreateMilestone {
            name: name.to_string(),
            description: None,
            pct,
            position: None,
            acceptance_criteria: None,
        }
    }

    fn evidence() -> SubmitMilestone {
        SubmitMilestone {
            evidence: "https://github.com/acme/proto/pull/42".to_string(),
        }
    }

    async fn fund(db: &db::DBService, campaign_id: Uuid, backer: &User, amount: i64) {
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
                payment_intent_id: None,
            },
        )
        .await
        .unwrap();
        Pledge::capture(&db.pool, pledge.id).await.unwrap();
    }

    #[test]
    fn release_is_floored() {
        assert_eq!(release_amount(10_001, 33), 3_300);
        assert_eq!(release_amount(0, 50), 0);
        assert_eq!(release_amount(999, 100), 999);
    }

    #[tokio::test]
    async fn percentages_cannot_exceed_100() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let campaign = test_support::draft_campaign(&db, &maker, 10_000).await;
        let svc = MilestoneService::new(db.pool.clone(), 10);

        let first = svc.create(&maker, campaign.id, &new_milestone("Tests", 70)).await.unwrap();
        assert!(matches!(
            svc.create(&maker, campaign.id, &new_milestone("Docs", 40)).await,
            Err(MilestoneError::Validation(_))
        ));
        assert!(matches!(
            svc.create(&maker, campaign.id, &new_milestone("Zero", 0)).await,
            Err(MilestoneError::Validation(_))
        ));
        svc.create(&maker, campaign.id, &new_milestone("Docs", 30)).await.unwrap();

        // Raising the first one would overflow
        let bump = UpdateMilestone {
            pct: Some(80),
            ..Default::default()
        };
        assert!(matches!(
            svc.update(&maker, campaign.id, first.id, &bump).await,
            Err(MilestoneError::Validation(_))
        ));
        svc.delete(&maker, campaign.id, first.id).await.unwrap();
        assert!(svc.update(&maker, campaign.id, first.id, &bump).await.is_err());
    }

    #[tokio::test]
    async fn pct_is_frozen_once_live() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        let svc = MilestoneService::new(db.pool.clone(), 10);
        let milestone = svc.list(campaign.id, None).await.unwrap().remove(0);

        let err = svc
            .update(
                &maker,
                campaign.id,
                milestone.id,
                &UpdateMilestone {
                    pct: Some(90),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MilestoneError::Validation(_)));

        let renamed = svc
            .update(
                &maker,
                campaign.id,
                milestone.id,
                &UpdateMilestone {
                    name: Some("General availability".to_string()),
                    pct: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "General availability");
        assert!(svc.delete(&maker, campaign.id, milestone.id).await.is_err());
    }

    #[tokio::test]
    async fn order_is_frozen_once_live() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let campaign = test_support::draft_campaign(&db, &maker, 10_000).await;
        let svc = MilestoneService::new(db.pool.clone(), 10);
        let first = svc.create(&maker, campaign.id, &new_milestone("Alpha", 50)).await.unwrap();
        let second = svc.create(&maker, campaign.id, &new_milestone("Beta", 50)).await.unwrap();
        Campaign::update_status(&db.pool, campaign.id, CampaignStatus::Draft, CampaignStatus::Live)
            .await
            .unwrap();

        let err = svc
            .update(
                &maker,
                campaign.id,
                second.id,
                &UpdateMilestone {
                    position: Some(first.position - 1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            MilestoneError::Validation(errors) => assert!(errors.fields.contains_key("position")),
            other => panic!("unexpected error: {other:?}"),
        }

        // Restating the current position is not a move
        let unchanged = svc
            .update(
                &maker,
                campaign.id,
                second.id,
                &UpdateMilestone {
                    position: Some(second.position),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unchanged.position, second.position);
        let order: Vec<_> = svc.list(campaign.id, None).await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(order, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn submission_is_gated_on_earlier_milestones() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let admin = test_support::admin(&db, "admin@example.com").await;
        let backer = test_support::user(&db, "backer@example.com").await;
        let campaign = test_support::draft_campaign(&db, &maker, 10_000).await;
        let svc = MilestoneService::new(db.pool.clone(), 10);
        let first = svc.create(&maker, campaign.id, &new_milestone("Tests", 40)).await.unwrap();
        let second = svc.create(&maker, campaign.id, &new_milestone("Audit", 60)).await.unwrap();

        // Not published yet
        assert!(matches!(
            svc.submit(&maker, campaign.id, first.id, &evidence()).await,
            Err(MilestoneError::Validation(_))
        ));
        Campaign::update_status(&db.pool, campaign.id, CampaignStatus::Draft, CampaignStatus::Live)
            .await
            .unwrap();
        fund(&db, campaign.id, &backer, 20_000).await;

        assert!(matches!(
            svc.submit(&maker, campaign.id, second.id, &evidence()).await,
            Err(MilestoneError::Validation(_))
        ));
        let submitted = svc.submit(&maker, campaign.id, first.id, &evidence()).await.unwrap();
        assert_eq!(submitted.status, MilestoneStatus::Submitted);
        assert!(submitted.review_deadline_at.is_some());

        assert!(matches!(
            svc.accept(&maker, campaign.id, first.id).await,
            Err(MilestoneError::Access(AccessError::Forbidden(_)))
        ));
        let accepted = svc.accept(&admin, campaign.id, first.id).await.unwrap();
        assert_eq!(accepted.released_cents, 8_000);

        let submitted = svc.submit(&maker, campaign.id, second.id, &evidence()).await.unwrap();
        assert_eq!(submitted.status, MilestoneStatus::Submitted);
    }

    #[tokio::test]
    async fn rejection_needs_reason_and_allows_resubmission() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let admin = test_support::admin(&db, "admin@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        let svc = MilestoneService::new(db.pool.clone(), 10);
        let milestone = svc.list(campaign.id, None).await.unwrap().remove(0);
        svc.submit(&maker, campaign.id, milestone.id, &evidence()).await.unwrap();

        let blank = RejectMilestone { reason: " ".to_string() };
        assert!(matches!(
            svc.reject(&admin, campaign.id, milestone.id, &blank).await,
            Err(MilestoneError::Validation(_))
        ));
        let rejected = svc
            .reject(
                &admin,
                campaign.id,
                milestone.id,
                &RejectMilestone {
                    reason: "No test coverage report".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, MilestoneStatus::Rejected);
        assert!(matches!(
            svc.accept(&admin, campaign.id, milestone.id).await,
            Err(MilestoneError::InvalidState(MilestoneStatus::Rejected))
        ));

        let again = svc.submit(&maker, campaign.id, milestone.id, &evidence()).await.unwrap();
        assert!(again.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn overdue_reviews_are_accepted() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let backer = test_support::user(&db, "backer@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        fund(&db, campaign.id, &backer, 5_000).await;
        let milestone = Milestone::find_by_campaign(&db.pool, campaign.id).await.unwrap().remove(0);

        // A negative window puts the deadline in the past
        let lapsed = MilestoneService::new(db.pool.clone(), -1);
        lapsed.submit(&maker, campaign.id, milestone.id, &evidence()).await.unwrap();
        assert_eq!(lapsed.accept_overdue().await.unwrap(), 1);

        let accepted = Milestone::find_by_id(&db.pool, milestone.id).await.unwrap().unwrap();
        assert_eq!(accepted.status, MilestoneStatus::Accepted);
        assert_eq!(accepted.released_cents, 5_000);
        assert_eq!(lapsed.accept_overdue().await.unwrap(), 0);
    }
}
