use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json as ResponseJson,
    routing::post,
};
use chrono::Utc;
use deployment::Deployment;
use secrecy::ExposeSecret;
use serde::Serialize;
use services::services::stripe_webhook::{
    StripeEvent, WebhookError, WebhookOutcome, WebhookService, verify_signature,
};

use crate::{DeploymentImpl, error::ApiError};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Acknowledgement body expected by the processor.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// POST /api/webhooks/stripe
/// The signature covers the raw body, so it is read as bytes and parsed only
/// after verification. Errors after verification answer 5xx so the event is
/// redelivered.
pub async fn stripe_webhook(
    State(deployment): State<DeploymentImpl>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ResponseJson<WebhookAck>, ApiError> {
    let secret = deployment
        .config()
        .stripe_webhook_secret
        .as_ref()
        .ok_or(WebhookError::MissingSecret)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::InvalidSignature("missing Stripe-Signature header"))?;
    verify_signature(&body, signature, secret.expose_secret(), Utc::now().timestamp())?;

    let event: StripeEvent =
        serde_json::from_slice(&body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let service = WebhookService::new(
        deployment.db().pool.clone(),
        deployment.email(),
        deployment.app_base_url(),
    );
    let outcome = service.handle(&event).await?;

    Ok(ResponseJson(WebhookAck {
        received: true,
        duplicate: outcome == WebhookOutcome::Duplicate,
    }))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}
