//! Pledge checkout through the payment gateway. Pledge rows are created by the webhook.

use std::sync::Arc;

use db::models::{
    campaign::{Campaign, CampaignStatus},
    platform_settings::PlatformSettings,
    pledge_tier::PledgeTier,
    user::User,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::AccessError,
    payments::{CheckoutSessionRequest, PaymentError, PaymentGateway},
    validation::ValidationErrors,
};

pub const MIN_PLEDGE_CENTS: i64 = 100;
pub const MAX_PLEDGE_CENTS: i64 = 100_000_000;
pub const CURRENCY: &str = "usd";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("payment processor error: {0}")]
    Payment(#[from] PaymentError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct StartCheckout {
    pub amount_cents: i64,
    pub pledge_tier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CheckoutStarted {
    pub session_id: String,
    pub url: Option<String>,
}

/// Platform fee in cents for `amount_cents`, floored.
pub fn application_fee(amount_cents: i64, fee_bps: i64) -> i64 {
    amount_cents * fee_bps / 10_000
}

pub struct CheckoutService {
    pool: SqlitePool,
    payments: Arc<dyn PaymentGateway>,
    app_base_url: String,
}

impl CheckoutService {
    pub fn new(pool: SqlitePool, payments: Arc<dyn PaymentGateway>, app_base_url: String) -> Self {
        Self {
            pool,
            payments,
            app_base_url,
        }
    }

    pub async fn start_checkout(
        &self,
        backer: &User,
        campaign_id: Uuid,
        data: &StartCheckout,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let campaign = Campaign::find_by_id(&self.pool, campaign_id)
            .await?
            .filter(|c| c.status.is_public())
            .ok_or(AccessError::NotFound("campaign"))?;

        let mut errors = ValidationErrors::new();
        errors.check(
            campaign.status == CampaignStatus::Live,
            "campaign",
            "campaign is not accepting pledges",
        );
        errors.check(
            (MIN_PLEDGE_CENTS..=MAX_PLEDGE_CENTS).contains(&data.amount_cents),
            "amount_cents",
            format!("must be between {MIN_PLEDGE_CENTS} and {MAX_PLEDGE_CENTS}"),
        );
        if let Some(tier_id) = data.pledge_tier_id {
            match PledgeTier::find_by_id(&self.pool, tier_id).await? {
                Some(tier) if tier.campaign_id == campaign_id && tier.is_active => {
                    errors.check(
                        data.amount_cents >= tier.amount_cents,
                        "amount_cents",
                        format!("must be at least {} for this tier", tier.amount_cents),
                    );
                }
                _ => errors.add("pledge_tier_id", "is not an available tier for this campaign"),
            }
        }
        errors.into_result()?;

        let settings = PlatformSettings::get(&self.pool).await?;
        let campaign_url = format!("{}/campaigns/{}", self.app_base_url, campaign_id);
        let request = CheckoutSessionRequest {
            campaign_id,
            campaign_title: campaign.title.clone(),
            backer_id: backer.id,
            backer_email: backer.email.clone(),
            pledge_tier_id: data.pledge_tier_id,
            amount_cents: data.amount_cents,
            application_fee_cents: application_fee(data.amount_cents, settings.platform_fee_bps),
            currency: CURRENCY.to_string(),
            success_url: format!("{campaign_url}?pledge=success"),
            cancel_url: format!("{campaign_url}?pledge=cancelled"),
        };

        let session = self.payments.create_checkout_session(&request).await?;
        info!(
            campaign_id = %campaign_id,
            backer_id = %backer.id,
            session_id = %session.id,
            amount_cents = data.amount_cents,
            fee_cents = request.application_fee_cents,
            "Checkout session created"
        );
        Ok(CheckoutStarted {
            session_id: session.id,
            url: session.url,
        })
    }
}
