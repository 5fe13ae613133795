use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use db::{
    DBService,
    models::{
        campaign::{Campaign, CampaignStatus, CreateCampaign},
        milestone::{CreateMilestone, Milestone},
        user::{User, UserRole},
    },
};
use uuid::Uuid;

use super::{
    claude_api::{ClaudeApiError, CompletionModel},
    email::{EmailError, EmailMessage, EmailSender},
    payments::{
        CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway, ProcessorRefund,
        RefundRequest,
    },
};

pub async fn db() -> DBService {
    DBService::new_in_memory().await.unwrap()
}

pub async fn user(db: &DBService, email: &str) -> User {
    User::create(&db.pool, Uuid::new_v4(), email, None, UserRole::User)
        .await
        .unwrap()
}

pub async fn admin(db: &DBService, email: &str) -> User {
    User::create(&db.pool, Uuid::new_v4(), email, Some("Admin"), UserRole::Admin)
        .await
        .unwrap()
}

pub async fn draft_campaign(db: &DBService, maker: &User, goal_cents: i64) -> Campaign {
    Campaign::create(
        &db.pool,
        Uuid::new_v4(),
        maker.id,
        &CreateCampaign {
            title: "Harden the prototype".to_string(),
            summary: Some("Security and reliability work".to_string()),
            description: None,
            repo_url: None,
            funding_goal_cents: goal_cents,
            deadline_at: None,
            organization_id: None,
        },
    )
    .await
    .unwrap()
}

/// Live campaign with a single milestone carrying the full release.
pub async fn live_campaign(db: &DBService, maker: &User, goal_cents: i64) -> Campaign {
    let campaign = draft_campaign(db, maker, goal_cents).await;
    Milestone::create(
        &db.pool,
        Uuid::new_v4(),
        campaign.id,
        &CreateMilestone {
            name: "Launch".to_string(),
            description: None,
            pct: 100,
            position: None,
            acceptance_criteria: None,
        },
    )
    .await
    .unwrap();
    Campaign::update_status(&db.pool, campaign.id, CampaignStatus::Draft, CampaignStatus::Live)
        .await
        .unwrap()
        .unwrap()
}

#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmail {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub fail_refunds: AtomicBool,
    pub checkouts: Mutex<Vec<CheckoutSessionRequest>>,
    pub refunds: Mutex<Vec<RefundRequest>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.test/{id}")),
            id,
        })
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProcessorRefund, PaymentError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(PaymentError::Processor {
                status: 400,
                message: "charge already refunded".to_string(),
            });
        }
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push(request.clone());
        Ok(ProcessorRefund {
            id: format!("re_test_{}", refunds.len()),
            status: Some("succeeded".to_string()),
        })
    }
}

/// Replies with a fixed string and keeps the prompts it was given.
pub struct CannedModel {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl CannedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionModel for CannedModel {
    async fn complete_text(
        &self,
        prompt: &str,
        _system: Option<&str>,
        _max_tokens: u32,
    ) -> Result<String, ClaudeApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
