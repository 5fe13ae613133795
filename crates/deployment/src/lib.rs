use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use services::services::{
    auth::SessionTokens,
    claude_api::{ClaudeApiError, CompletionModel},
    config::{Config, ConfigError},
    email::{EmailError, EmailSender},
    github::{GitHubError, SourceHost},
    milestone_review::MilestoneReviewService,
    payments::{PaymentError, PaymentGateway},
};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Ai(#[from] ClaudeApiError),
    #[error(transparent)]
    Source(#[from] GitHubError),
}

/// Everything a request handler needs from the running process.
///
/// External integrations that have no credentials configured come back as
/// `None`; handlers answer those requests with a 503.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new(config: Config) -> Result<Self, DeploymentError>;

    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn session_tokens(&self) -> &SessionTokens;

    fn email(&self) -> Arc<dyn EmailSender>;

    fn payments(&self) -> Option<Arc<dyn PaymentGateway>>;

    fn completion_model(&self) -> Option<Arc<dyn CompletionModel>>;

    fn source_host(&self) -> Arc<dyn SourceHost>;

    fn app_base_url(&self) -> String {
        self.config().app_base_url.clone()
    }

    /// Start the periodic sweep over review windows and sign-in codes.
    async fn spawn_background_tasks(&self) -> JoinHandle<()> {
        MilestoneReviewService::spawn(self.db().clone(), self.config().milestone_review_days).await
    }
}
