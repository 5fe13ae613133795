use std::sync::Arc;

use db::models::{
    user::User,
    waitlist::{CreateWaitlistEntry, WaitlistEntry, WaitlistStatus},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use utils::text::{is_valid_email, normalize_email};
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    email::{EmailSender, send_best_effort},
    email_templates,
    validation::ValidationErrors,
};

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("this email is already on the waitlist")]
    AlreadyJoined,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct WaitlistService {
    pool: SqlitePool,
    email: Arc<dyn EmailSender>,
    app_base_url: String,
}

impl WaitlistService {
    pub fn new(pool: SqlitePool, email: Arc<dyn EmailSender>, app_base_url: String) -> Self {
        Self {
            pool,
            email,
            app_base_url,
        }
    }

    pub async fn join(&self, data: &CreateWaitlistEntry) -> Result<WaitlistEntry, WaitlistError> {
        let email = normalize_email(&data.email);
        if !is_valid_email(&email) {
            return Err(ValidationErrors::single("email", "must be a valid email address").into());
        }
        if WaitlistEntry::find_by_email(&self.pool, &email).await?.is_some() {
            return Err(WaitlistError::AlreadyJoined);
        }

        let reason = data.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        let entry = match WaitlistEntry::create(&self.pool, Uuid::new_v4(), &email, reason).await {
            Ok(entry) => entry,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(WaitlistError::AlreadyJoined);
            }
            Err(e) => return Err(e.into()),
        };

        send_best_effort(self.email.as_ref(), email_templates::waitlist_joined().to(&entry.email)).await;
        info!(entry_id = %entry.id, "Waitlist entry created");
        Ok(entry)
    }

    pub async fn list(
        &self,
        admin: &User,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        access::require_admin(admin)?;
        Ok(WaitlistEntry::list(&self.pool, status).await?)
    }

    pub async fn decide(
        &self,
        admin: &User,
        entry_id: Uuid,
        approved: bool,
    ) -> Result<WaitlistEntry, WaitlistError> {
        access::require_admin(admin)?;
        let status = if approved {
            WaitlistStatus::Approved
        } else {
            WaitlistStatus::Rejected
        };
        let entry = WaitlistEntry::update_status(&self.pool, entry_id, status)
            .await?
            .ok_or(AccessError::NotFound("waitlist entry"))?;

        let message = email_templates::waitlist_decision(approved, &self.app_base_url).to(&entry.email);
        send_best_effort(self.email.as_ref(), message).await;
        info!(entry_id = %entry_id, status = %status, admin_id = %admin.id, "Waitlist entry decided");
        Ok(entry)
    }
}
