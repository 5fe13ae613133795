//! Verification and dispatch of payment processor webhook events.

use std::sync::Arc;

use db::models::{
    campaign::Campaign,
    dispute::{Dispute, DisputeStatus, UpsertDispute},
    pledge::{CreatePledge, Pledge, PledgeStatus},
    pledge_tier::PledgeTier,
    user::User,
    user_settings::UserSettings,
    webhook_event::WebhookEvent,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    email::{EmailSender, send_best_effort},
    email_templates,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("invalid signature: {0}")]
    InvalidSignature(&'static str),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Check a `t=<unix>,v1=<hex>` signature header against the raw body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature("missing v1 signature"));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::InvalidSignature("timestamp outside tolerance"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature("unusable secret"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = signatures
        .iter()
        .any(|sig| bool::from(sig.as_slice().ct_eq(expected.as_slice())));
    if matched {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature("signature mismatch"))
    }
}

/// Header value for `payload`, as the processor would compute it.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    campaign_id: Option<String>,
    backer_id: Option<String>,
    pledge_tier_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    payment_intent: Option<String>,
    amount_refunded: i64,
}

#[derive(Debug, Deserialize)]
struct DisputeObject {
    id: String,
    payment_intent: Option<String>,
    amount: i64,
    reason: Option<String>,
    status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Ignored,
    Duplicate,
}

pub struct WebhookService {
    pool: SqlitePool,
    email: Arc<dyn EmailSender>,
    app_base_url: String,
}

impl WebhookService {
    pub fn new(pool: SqlitePool, email: Arc<dyn EmailSender>, app_base_url: String) -> Self {
        Self {
            pool,
            email,
            app_base_url,
        }
    }

    /// Process a verified event once. The event id is recorded only after the
    /// handler succeeds, so a failed delivery is retried by the processor.
    pub async fn handle(&self, event: &StripeEvent) -> Result<WebhookOutcome, WebhookError> {
        if WebhookEvent::exists(&self.pool, &event.id).await? {
            debug!(event_id = %event.id, "Duplicate webhook event");
            return Ok(WebhookOutcome::Duplicate);
        }

        let object = &event.data.object;
        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.checkout_completed(parse(object)?).await?,
            "payment_intent.succeeded" => {
                let intent: PaymentIntentObject = parse(object)?;
                self.payment_intent_transition(&intent.id, PledgeStatus::Captured)
                    .await?
            }
            "payment_intent.payment_failed" => {
                let intent: PaymentIntentObject = parse(object)?;
                self.payment_intent_transition(&intent.id, PledgeStatus::Failed)
                    .await?
            }
            "payment_intent.canceled" => {
                let intent: PaymentIntentObject = parse(object)?;
                self.payment_intent_transition(&intent.id, PledgeStatus::Cancelled)
                    .await?
            }
            "charge.refunded" => self.charge_refunded(parse(object)?).await?,
            "charge.dispute.created" | "charge.dispute.updated" | "charge.dispute.closed" => {
                self.dispute_changed(parse(object)?).await?
            }
            other => {
                debug!(event_type = %other, "Unhandled webhook event type");
                WebhookOutcome::Ignored
            }
        };

        WebhookEvent::record(&self.pool, &event.id, &event.event_type).await?;
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = ?outcome,
            "Webhook event handled"
        );
        Ok(outcome)
    }

    async fn checkout_completed(
        &self,
        session: CheckoutSessionObject,
    ) -> Result<WebhookOutcome, WebhookError> {
        let campaign_id = parse_uuid(session.metadata.campaign_id.as_deref());
        let backer_id = parse_uuid(session.metadata.backer_id.as_deref());
        let (Some(campaign_id), Some(backer_id), Some(amount)) =
            (campaign_id, backer_id, session.amount_total)
        else {
            warn!(session_id = %session.id, "Checkout session without pledge metadata, ignoring");
            return Ok(WebhookOutcome::Ignored);
        };

        if Campaign::find_by_id(&self.pool, campaign_id).await?.is_none()
            || User::find_by_id(&self.pool, backer_id).await?.is_none()
        {
            warn!(
                session_id = %session.id,
                campaign_id = %campaign_id,
                backer_id = %backer_id,
                "Checkout session references a missing campaign or backer, ignoring"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        // A tier removed after checkout started still leaves a valid pledge
        let pledge_tier_id = match parse_uuid(session.metadata.pledge_tier_id.as_deref()) {
            Some(tier_id) => PledgeTier::find_by_id(&self.pool, tier_id)
                .await?
                .filter(|tier| tier.campaign_id == campaign_id)
                .map(|tier| tier.id),
            None => None,
        };

        let data = CreatePledge {
            campaign_id,
            backer_id,
            pledge_tier_id,
            amount_cents: amount,
            currency: session.currency.unwrap_or_else(|| "usd".to_string()),
            checkout_session_id: session.id.clone(),
            payment_intent_id: session.payment_intent,
        };
        let (pledge, created) = Pledge::create_from_checkout(&self.pool, Uuid::new_v4(), &data).await?;
        if created {
            info!(pledge_id = %pledge.id, campaign_id = %campaign_id, "Pledge recorded from checkout");
        }

        if session.payment_status.as_deref() == Some("paid") {
            if let Some(captured) = Pledge::capture(&self.pool, pledge.id).await? {
                self.send_confirmation(&captured).await?;
            }
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn payment_intent_transition(
        &self,
        payment_intent_id: &str,
        next: PledgeStatus,
    ) -> Result<WebhookOutcome, WebhookError> {
        match Pledge::transition_pending_by_payment_intent(&self.pool, payment_intent_id, next).await? {
            Some(pledge) => {
                info!(pledge_id = %pledge.id, status = %next, "Pledge status updated");
                if next == PledgeStatus::Captured {
                    self.send_confirmation(&pledge).await?;
                }
                Ok(WebhookOutcome::Processed)
            }
            None => {
                debug!(payment_intent_id, "No pending pledge for payment intent");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn charge_refunded(&self, charge: ChargeObject) -> Result<WebhookOutcome, WebhookError> {
        let Some(payment_intent_id) = charge.payment_intent else {
            return Ok(WebhookOutcome::Ignored);
        };
        match Pledge::sync_refunded(&self.pool, &payment_intent_id, charge.amount_refunded).await? {
            Some(pledge) => {
                info!(
                    pledge_id = %pledge.id,
                    refunded_cents = pledge.refunded_cents,
                    status = %pledge.status,
                    "Pledge refund total synced"
                );
                Ok(WebhookOutcome::Processed)
            }
            None => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn dispute_changed(&self, dispute: DisputeObject) -> Result<WebhookOutcome, WebhookError> {
        let pledge_id = match dispute.payment_intent.as_deref() {
            Some(pi) => Pledge::find_by_payment_intent(&self.pool, pi)
                .await?
                .map(|p| p.id),
            None => None,
        };
        let stored = Dispute::upsert(
            &self.pool,
            Uuid::new_v4(),
            &UpsertDispute {
                pledge_id,
                processor_dispute_id: dispute.id,
                payment_intent_id: dispute.payment_intent,
                amount_cents: dispute.amount,
                reason: dispute.reason,
                status: DisputeStatus::from_processor(&dispute.status),
            },
        )
        .await?;
        warn!(
            dispute_id = %stored.processor_dispute_id,
            status = %stored.status,
            amount_cents = stored.amount_cents,
            "Payment dispute recorded"
        );
        Ok(WebhookOutcome::Processed)
    }

    async fn send_confirmation(&self, pledge: &Pledge) -> Result<(), WebhookError> {
        let settings = UserSettings::find_or_create(&self.pool, pledge.backer_id).await?;
        if !settings.email_on_pledge {
            return Ok(());
        }
        let (Some(backer), Some(campaign)) = (
            User::find_by_id(&self.pool, pledge.backer_id).await?,
            Campaign::find_by_id(&self.pool, pledge.campaign_id).await?,
        ) else {
            return Ok(());
        };
        let url = format!("{}/campaigns/{}", self.app_base_url, campaign.id);
        let message =
            email_templates::pledge_confirmation(&campaign.title, pledge.amount_cents, &url).to(&backer.email);
        send_best_effort(self.email.as_ref(), message).await;
        Ok(())
    }
}

fn parse<T: for<'de> Deserialize<'de>>(object: &Value) -> Result<T, WebhookError> {
    T::deserialize(object).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

fn parse_uuid(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v).ok())
}
