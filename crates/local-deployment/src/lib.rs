use std::sync::Arc;

use async_trait::async_trait;
use db::{DBService, models::platform_settings::PlatformSettings};
use deployment::{Deployment, DeploymentError};
use secrecy::{ExposeSecret, SecretString};
use services::services::{
    auth::SessionTokens,
    claude_api::{ClaudeApiClient, CompletionModel},
    config::Config,
    email::{EmailSender, LoggingSender, ResendSender},
    github::{GitHubClient, SourceHost},
    payments::{PaymentGateway, StripeClient},
};
use tracing::{info, warn};

/// Single-process deployment backed by SQLite and the hosted integrations
/// whose credentials are present in [`Config`].
#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    session_tokens: SessionTokens,
    email: Arc<dyn EmailSender>,
    payments: Option<Arc<dyn PaymentGateway>>,
    completion_model: Option<Arc<dyn CompletionModel>>,
    source_host: Arc<dyn SourceHost>,
}

fn owned(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

impl LocalDeployment {
    /// Assemble a deployment from already-built parts. Used by tests to swap
    /// the external integrations for fakes.
    pub fn from_parts(
        config: Config,
        db: DBService,
        email: Arc<dyn EmailSender>,
        payments: Option<Arc<dyn PaymentGateway>>,
        completion_model: Option<Arc<dyn CompletionModel>>,
        source_host: Arc<dyn SourceHost>,
    ) -> Self {
        let session_tokens = SessionTokens::new(owned(&config.jwt_secret), config.session_ttl_hours);
        Self {
            config: Arc::new(config),
            db,
            session_tokens,
            email,
            payments,
            completion_model,
            source_host,
        }
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let settings = PlatformSettings::seed_default_fee(&db.pool, config.default_fee_bps).await?;
        info!(
            platform_fee_bps = settings.platform_fee_bps,
            signups_restricted = settings.signups_restricted,
            "Platform settings loaded"
        );

        let email: Arc<dyn EmailSender> = match &config.resend_api_key {
            Some(key) => Arc::new(ResendSender::new(owned(key), config.email_from.clone())?),
            None => {
                warn!("RESEND_API_KEY not set, emails will be logged instead of sent");
                Arc::new(LoggingSender)
            }
        };

        let payments: Option<Arc<dyn PaymentGateway>> = match &config.stripe_secret_key {
            Some(key) => Some(Arc::new(StripeClient::new(owned(key))?)),
            None => {
                warn!("STRIPE_SECRET_KEY not set, checkout and refunds are disabled");
                None
            }
        };
        if config.stripe_webhook_secret.is_none() {
            warn!("STRIPE_WEBHOOK_SECRET not set, payment webhooks will be rejected");
        }

        let completion_model: Option<Arc<dyn CompletionModel>> = match &config.anthropic_api_key {
            Some(key) => Some(Arc::new(ClaudeApiClient::new(owned(key), None)?)),
            None => {
                warn!("ANTHROPIC_API_KEY not set, AI content features are disabled");
                None
            }
        };

        let source_host: Arc<dyn SourceHost> =
            Arc::new(GitHubClient::new(config.github_token.as_ref().map(owned))?);

        Ok(Self::from_parts(config, db, email, payments, completion_model, source_host))
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn session_tokens(&self) -> &SessionTokens {
        &self.session_tokens
    }

    fn email(&self) -> Arc<dyn EmailSender> {
        self.email.clone()
    }

    fn payments(&self) -> Option<Arc<dyn PaymentGateway>> {
        self.payments.clone()
    }

    fn completion_model(&self) -> Option<Arc<dyn CompletionModel>> {
        self.completion_model.clone()
    }

    fn source_host(&self) -> Arc<dyn SourceHost> {
        self.source_host.clone()
    }
}
