//! Partial and full refunds of captured pledges.

use std::sync::Arc;

use db::models::{
    campaign::Campaign,
    dispute::Dispute,
    pledge::{Pledge, PledgeStatus},
    refund::Refund,
    user::User,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    payments::{PaymentError, PaymentGateway, RefundRequest},
    validation::ValidationErrors,
};

#[derive(Debug, Error)]
pub enum RefundError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("only captured pledges can be refunded (pledge is {0})")]
    NotRefundable(PledgeStatus),
    #[error("refund of {requested} exceeds the refundable {remaining}")]
    ExceedsRemaining { requested: i64, remaining: i64 },
    #[error("payments is not configured")]
    PaymentsUnavailable,
    #[error("payment processor error: {0}")]
    Payment(#[from] PaymentError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct CreateRefund {
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

/// Refund reads work from the database alone; issuing a refund needs a gateway.
pub struct RefundService {
    pool: SqlitePool,
    payments: Option<Arc<dyn PaymentGateway>>,
}

impl RefundService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, payments: None }
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    async fn pledge_with_campaign(&self, pledge_id: Uuid) -> Result<(Pledge, Campaign), RefundError> {
        let pledge = Pledge::find_by_id(&self.pool, pledge_id)
            .await?
            .ok_or(AccessError::NotFound("pledge"))?;
        let campaign = Campaign::find_by_id(&self.pool, pledge.campaign_id)
            .await?
            .ok_or(AccessError::NotFound("campaign"))?;
        Ok((pledge, campaign))
    }

    /// Reserve the amount, ask the processor, then settle or roll back the reservation.
    pub async fn create_refund(
        &self,
        user: &User,
        pledge_id: Uuid,
        data: &CreateRefund,
    ) -> Result<Refund, RefundError> {
        let payments = self.payments.as_ref().ok_or(RefundError::PaymentsUnavailable)?;
        let (pledge, campaign) = self.pledge_with_campaign(pledge_id).await?;
        if !access::can_edit(&self.pool, &campaign, user).await? {
            return Err(AccessError::Forbidden("not allowed to refund this pledge").into());
        }
        if pledge.status != PledgeStatus::Captured {
            return Err(RefundError::NotRefundable(pledge.status));
        }
        let Some(payment_intent_id) = pledge.payment_intent_id.clone() else {
            return Err(RefundError::NotRefundable(pledge.status));
        };

        let remaining = pledge.refundable_cents();
        let amount = data.amount_cents.unwrap_or(remaining);
        if amount <= 0 {
            return Err(ValidationErrors::single("amount_cents", "must be greater than zero").into());
        }
        if amount > remaining {
            return Err(RefundError::ExceedsRemaining {
                requested: amount,
                remaining,
            });
        }
        let reason = data
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let mut tx = self.pool.begin().await?;
        if !Pledge::reserve_refund(&mut *tx, pledge_id, amount).await? {
            // Another refund took the remainder first
            tx.rollback().await?;
            let remaining = Pledge::find_by_id(&self.pool, pledge_id)
                .await?
                .map(|p| p.refundable_cents())
                .unwrap_or(0);
            return Err(RefundError::ExceedsRemaining {
                requested: amount,
                remaining,
            });
        }
        let refund = Refund::create(&mut *tx, Uuid::new_v4(), pledge_id, amount, reason, Some(user.id)).await?;
        tx.commit().await?;

        let request = RefundRequest {
            payment_intent_id,
            amount_cents: amount,
            idempotency_key: refund.id.to_string(),
            reason: reason.map(str::to_string),
        };
        let outcome = payments.create_refund(&request).await;
        match outcome {
            Ok(processed) if !processed.is_failed() => {
                let refund = Refund::mark_succeeded(&self.pool, refund.id, &processed.id).await?;
                if Pledge::mark_refunded_if_complete(&self.pool, pledge_id).await?.is_some() {
                    info!(pledge_id = %pledge_id, "Pledge fully refunded");
                }
                info!(
                    pledge_id = %pledge_id,
                    refund_id = %refund.id,
                    amount_cents = amount,
                    requested_by = %user.id,
                    "Refund succeeded"
                );
                Ok(refund)
            }
            Ok(processed) => {
                self.fail_refund(&refund, amount).await?;
                Err(PaymentError::Processor {
                    status: 402,
                    message: format!("refund {} was {}", processed.id, processed.status.unwrap_or_default()),
                }
                .into())
            }
            Err(e) => {
                self.fail_refund(&refund, amount).await?;
                Err(e.into())
            }
        }
    }

    async fn fail_refund(&self, refund: &Refund, amount: i64) -> Result<(), RefundError> {
        error!(pledge_id = %refund.pledge_id, refund_id = %refund.id, "Refund failed at the processor");
        Refund::mark_failed(&self.pool, refund.id).await?;
        Pledge::release_refund(&self.pool, refund.pledge_id, amount).await?;
        Ok(())
    }

    /// Visible to campaign editors, admins and the backer.
    pub async fn list_for_pledge(&self, user: &User, pledge_id: Uuid) -> Result<Vec<Refund>, RefundError> {
        let (pledge, campaign) = self.pledge_with_campaign(pledge_id).await?;
        if pledge.backer_id != user.id && !access::can_edit(&self.pool, &campaign, user).await? {
            return Err(AccessError::NotFound("pledge").into());
        }
        Ok(Refund::find_by_pledge(&self.pool, pledge_id).await?)
    }

    pub async fn list_all(&self, admin: &User) -> Result<Vec<Refund>, RefundError> {
        access::require_admin(admin)?;
        Ok(Refund::list_all(&self.pool).await?)
    }

    pub async fn list_disputes(&self, admin: &User) -> Result<Vec<Dispute>, RefundError> {
        access::require_admin(admin)?;
        Ok(Dispute::list(&self.pool).await?)
    }
}
