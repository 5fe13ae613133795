//! Transactional email delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("email provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Sends through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendSender {
    http: Client,
    api_key: SecretString,
    from: String,
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl ResendSender {
    pub fn new(api_key: SecretString, from: String) -> Result<Self, EmailError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(Self { http, api_key, from })
    }
}

#[async_trait]
impl EmailSender for ResendSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let payload = ResendPayload {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };
        let res = self
            .http
            .post(RESEND_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        if res.status().is_success() {
            info!(to = %message.to, subject = %message.subject, "Email sent");
            Ok(())
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            warn!(to = %message.to, status, "Email provider rejected message");
            Err(EmailError::Rejected { status, body })
        }
    }
}

/// Writes messages to the log instead of sending them. Used when no
/// provider key is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingSender;

#[async_trait]
impl EmailSender for LoggingSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "Email delivery disabled, logging message"
        );
        Ok(())
    }
}

/// Fire-and-log delivery for notifications that must not fail the caller.
pub async fn send_best_effort(sender: &dyn EmailSender, message: EmailMessage) {
    if let Err(e) = sender.send(&message).await {
        warn!(to = %message.to, subject = %message.subject, error = %e, "Failed to send email");
    }
}
