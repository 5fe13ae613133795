//! Background service that closes milestone review windows and clears spent
//! sign-in codes.

use std::time::Duration;

use db::{DBService, models::otp_code::OtpCode};
use tokio::time::interval;
use tracing::{debug, error, info};

use super::milestones::{MilestoneError, MilestoneService};

/// Auto-accepts submitted milestones once their review deadline passes
pub struct MilestoneReviewService {
    db: DBService,
    milestones: MilestoneService,
    poll_interval: Duration,
}

impl MilestoneReviewService {
    pub fn new(db: DBService, review_days: i64, poll_interval: Duration) -> Self {
        Self {
            milestones: MilestoneService::new(db.pool.clone(), review_days),
            db,
            poll_interval,
        }
    }

    /// Spawn the background review service, checking every minute
    pub async fn spawn(db: DBService, review_days: i64) -> tokio::task::JoinHandle<()> {
        let service = Self::new(db, review_days, Duration::from_secs(60));
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting milestone review service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One sweep. Failures are logged and retried on the next tick.
    pub async fn tick(&self) {
        if let Err(e) = self.check_review_windows().await {
            error!("Error checking milestone review windows: {}", e);
        }
        if let Err(e) = self.purge_spent_codes().await {
            error!("Error purging sign-in codes: {}", e);
        }
    }

    pub async fn check_review_windows(&self) -> Result<usize, MilestoneError> {
        let accepted = self.milestones.accept_overdue().await?;
        if accepted == 0 {
            debug!("Milestone review: nothing overdue");
        } else {
            info!(accepted, "Milestone review: auto-accepted overdue milestones");
        }
        Ok(accepted)
    }

    /// Delete sign-in codes that expired or were already used.
    pub async fn purge_spent_codes(&self) -> Result<u64, sqlx::Error> {
        let purged = OtpCode::delete_expired(&self.db.pool).await?;
        if purged > 0 {
            debug!(purged, "Purged spent sign-in codes");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        milestone::{Milestone, MilestoneStatus},
        otp_code::OtpCode,
    };

    use super::*;
    use crate::services::test_support;

    #[tokio::test]
    async fn tick_accepts_lapsed_reviews() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let campaign = test_support::live_campaign(&db, &maker, 10_000).await;
        let milestone = Milestone::find_by_campaign(&db.pool, campaign.id).await.unwrap().remove(0);
        Milestone::submit(&db.pool, milestone.id, "demo video", -2).await.unwrap();

        let service = MilestoneReviewService::new(db.clone(), 10, Duration::from_secs(60));
        assert_eq!(service.check_review_windows().await.unwrap(), 1);

        let milestone = Milestone::find_by_id(&db.pool, milestone.id).await.unwrap().unwrap();
        assert_eq!(milestone.status, MilestoneStatus::Accepted);
    }

    #[tokio::test]
    async fn tick_purges_spent_sign_in_codes() {
        let db = test_support::db().await;
        OtpCode::create(&db.pool, "late@example.com", "hash-late", -1).await.unwrap();
        let used = OtpCode::create(&db.pool, "used@example.com", "hash-used", 10).await.unwrap();
        OtpCode::consume(&db.pool, used.id).await.unwrap();
        let fresh = OtpCode::create(&db.pool, "fresh@example.com", "hash-fresh", 10).await.unwrap();

        let service = MilestoneReviewService::new(db.clone(), 10, Duration::from_secs(60));
        service.tick().await;

        assert_eq!(OtpCode::delete_expired(&db.pool).await.unwrap(), 0);
        let still_active = OtpCode::find_active(&db.pool, "fresh@example.com").await.unwrap().unwrap();
        assert_eq!(still_active.id, fresh.id);
    }
}
