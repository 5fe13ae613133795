//! Admin console: platform settings, user roles and platform-wide numbers.

use db::models::{
    campaign::{Campaign, CampaignStatus, CampaignStatusCount, CampaignWithFunding},
    dispute::Dispute,
    platform_settings::{PlatformSettings, UpdatePlatformSettings},
    pledge::Pledge,
    user::{User, UserRole},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    validation::ValidationErrors,
};

pub const MAX_PLATFORM_FEE_BPS: i64 = 3_000;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct PlatformStats {
    pub user_count: i64,
    pub campaigns_by_status: Vec<CampaignStatusCount>,
    pub captured_cents: i64,
    pub refunded_cents: i64,
    pub captured_pledges: i64,
    pub open_disputes: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SetRole {
    pub role: UserRole,
}

pub struct AdminService {
    pool: SqlitePool,
}

impl AdminService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn settings(&self, admin: &User) -> Result<PlatformSettings, AdminError> {
        access::require_admin(admin)?;
        Ok(PlatformSettings::get(&self.pool).await?)
    }

    pub async fn update_settings(
        &self,
        admin: &User,
        data: &UpdatePlatformSettings,
    ) -> Result<PlatformSettings, AdminError> {
        access::require_admin(admin)?;
        if let Some(bps) = data.platform_fee_bps {
            let mut errors = ValidationErrors::new();
            errors.check(
                (0..=MAX_PLATFORM_FEE_BPS).contains(&bps),
                "platform_fee_bps",
                format!("must be between 0 and {MAX_PLATFORM_FEE_BPS}"),
            );
            errors.into_result()?;
        }
        let settings = PlatformSettings::update(&self.pool, data).await?;
        info!(
            admin_id = %admin.id,
            signups_restricted = settings.signups_restricted,
            platform_fee_bps = settings.platform_fee_bps,
            "Platform settings updated"
        );
        Ok(settings)
    }

    pub async fn list_users(&self, admin: &User, limit: i64, offset: i64) -> Result<UserPage, AdminError> {
        access::require_admin(admin)?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);
        Ok(UserPage {
            users: User::list(&self.pool, limit, offset).await?,
            total: User::count(&self.pool).await?,
        })
    }

    pub async fn set_role(&self, admin: &User, user_id: Uuid, role: UserRole) -> Result<User, AdminError> {
        access::require_admin(admin)?;
        if user_id == admin.id && role != UserRole::Admin {
            return Err(ValidationErrors::single("role", "admins cannot demote themselves").into());
        }
        let user = User::update_role(&self.pool, user_id, role)
            .await?
            .ok_or(AccessError::NotFound("user"))?;
        info!(user_id = %user_id, role = %role, admin_id = %admin.id, "User role changed");
        Ok(user)
    }

    pub async fn list_campaigns(
        &self,
        admin: &User,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<CampaignWithFunding>, AdminError> {
        access::require_admin(admin)?;
        Ok(Campaign::list_all(&self.pool, status).await?)
    }

    pub async fn stats(&self, admin: &User) -> Result<PlatformStats, AdminError> {
        access::require_admin(admin)?;
        let totals = Pledge::totals(&self.pool).await?;
        Ok(PlatformStats {
            user_count: User::count(&self.pool).await?,
            campaigns_by_status: Campaign::count_by_status(&self.pool).await?,
            captured_cents: totals.captured_cents,
            refunded_cents: totals.refunded_cents,
            captured_pledges: totals.captured_count,
            open_disputes: Dispute::count_open(&self.pool).await?,
        })
    }
}
