//! Payment processor adapter: hosted checkout sessions and refunds.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("rate limited")]
    RateLimited,
    #[error("payment processor error ({status}): {message}")]
    Processor { status: u16, message: String },
    #[error("unexpected processor response: {0}")]
    InvalidResponse(String),
}

impl PaymentError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Processor { status, .. } => (500..=599).contains(status),
            Self::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub campaign_id: Uuid,
    pub campaign_title: String,
    pub backer_id: Uuid,
    pub backer_email: String,
    pub pledge_tier_id: Option<Uuid>,
    pub amount_cents: i64,
    pub application_fee_cents: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorRefund {
    pub id: String,
    pub status: Option<String>,
}

impl ProcessorRefund {
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_deref(), Some("failed") | Some("canceled"))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProcessorRefund, PaymentError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Stripe REST client. Requests are form-encoded and carry an idempotency
/// key, so transient failures are retried safely.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: &str,
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.api_base, path);
        (|| async {
            let res = self
                .http
                .post(&url)
                .basic_auth(self.secret_key.expose_secret(), None::<&str>)
                .header("Idempotency-Key", idempotency_key)
                .form(form)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        PaymentError::Timeout
                    } else {
                        PaymentError::Transport(e.to_string())
                    }
                })?;

            match res.status() {
                s if s.is_success() => res
                    .json::<T>()
                    .await
                    .map_err(|e| PaymentError::InvalidResponse(e.to_string())),
                StatusCode::TOO_MANY_REQUESTS => Err(PaymentError::RateLimited),
                s => {
                    let body = res.text().await.unwrap_or_default();
                    let message = serde_json::from_str::<StripeErrorBody>(&body)
                        .ok()
                        .and_then(|b| b.error.message)
                        .unwrap_or(body);
                    Err(PaymentError::Processor {
                        status: s.as_u16(),
                        message,
                    })
                }
            }
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(8))
                .with_max_times(3)
                .with_jitter(),
        )
        .when(|e: &PaymentError| e.should_retry())
        .notify(|e, dur| {
            warn!(
                "Stripe call to {} failed, retrying after {:.2}s: {}",
                path,
                dur.as_secs_f64(),
                e
            )
        })
        .await
    }
}

/// Form fields for a one-item hosted checkout. Metadata is copied onto the
/// payment intent too, so later intent events can be traced to the pledge.
pub fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("customer_email".into(), request.backer_email.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        ("line_items[0][price_data][currency]".into(), request.currency.clone()),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            format!("Pledge to {}", request.campaign_title),
        ),
    ];

    let mut metadata = vec![
        ("campaign_id", request.campaign_id.to_string()),
        ("backer_id", request.backer_id.to_string()),
        ("application_fee_cents", request.application_fee_cents.to_string()),
    ];
    if let Some(tier) = request.pledge_tier_id {
        metadata.push(("pledge_tier_id", tier.to_string()));
    }
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let key = Uuid::new_v4().to_string();
        let session: CheckoutSession = self
            .post_form("/checkout/sessions", &checkout_form(request), &key)
            .await?;
        info!(
            session_id = %session.id,
            campaign_id = %request.campaign_id,
            amount_cents = request.amount_cents,
            "Created checkout session"
        );
        Ok(session)
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProcessorRefund, PaymentError> {
        let mut form = vec![
            ("payment_intent".to_string(), request.payment_intent_id.clone()),
            ("amount".to_string(), request.amount_cents.to_string()),
        ];
        if let Some(reason) = &request.reason {
            form.push(("metadata[reason]".to_string(), reason.clone()));
        }
        let refund: ProcessorRefund = self
            .post_form("/refunds", &form, &request.idempotency_key)
            .await?;
        info!(
            refund_id = %refund.id,
            payment_intent_id = %request.payment_intent_id,
            amount_cents = request.amount_cents,
            "Created refund"
        );
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn checkout_form_carries_amount_and_metadata() {
        let campaign_id = Uuid::new_v4();
        let tier = Uuid::new_v4();
        let request = CheckoutSessionRequest {
            campaign_id,
            campaign_title: "Harden the prototype".to_string(),
            backer_id: Uuid::new_v4(),
            backer_email: "backer@example.com".to_string(),
            pledge_tier_id: Some(tier),
            amount_cents: 25_000,
            application_fee_cents: 1_250,
            currency: "usd".to_string(),
            success_url: "https://app/s".to_string(),
            cancel_url: "https://app/c".to_string(),
        };
        let form = checkout_form(&request);
        assert_eq!(lookup(&form, "mode"), Some("payment"));
        assert_eq!(lookup(&form, "line_items[0][price_data][unit_amount]"), Some("25000"));
        assert_eq!(
            lookup(&form, "metadata[campaign_id]"),
            Some(campaign_id.to_string().as_str())
        );
        assert_eq!(
            lookup(&form, "payment_intent_data[metadata][pledge_tier_id]"),
            Some(tier.to_string().as_str())
        );
        assert_eq!(lookup(&form, "metadata[application_fee_cents]"), Some("1250"));
    }

    #[test]
    fn retry_and_failure_classification() {
        assert!(PaymentError::Timeout.should_retry());
        assert!(
            !PaymentError::Processor {
                status: 402,
                message: "card declined".into()
            }
            .should_retry()
        );
        let refund = ProcessorRefund {
            id: "re_1".into(),
            status: Some("failed".into()),
        };
        assert!(refund.is_failed());
    }
}
