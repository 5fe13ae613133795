use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    access::AccessError,
    admin::AdminError,
    auth::AuthError,
    campaigns::CampaignServiceError,
    checkout::CheckoutError,
    content_generator::ContentError,
    marketplace::MarketplaceError,
    milestones::MilestoneError,
    refunds::RefundError,
    rewards::RewardError,
    stripe_webhook::WebhookError,
    validation::ValidationErrors,
    waitlist::WaitlistError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Campaign(#[from] CampaignServiceError),
    #[error(transparent)]
    Milestone(#[from] MilestoneError),
    #[error(transparent)]
    Reward(#[from] RewardError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Refund(#[from] RefundError),
    #[error(transparent)]
    Waitlist(#[from] WaitlistError),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ValidationErrors::single("body", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(ValidationErrors::single("path", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(ValidationErrors::single("query", rejection.body_text()))
    }
}

fn access_status(err: &AccessError) -> StatusCode {
    match err {
        AccessError::NotFound(_) => StatusCode::NOT_FOUND,
        AccessError::Forbidden(_) => StatusCode::FORBIDDEN,
        AccessError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Access(e) => access_status(e),
            ApiError::Auth(e) => match e {
                AuthError::Validation(_) | AuthError::InvalidCode => StatusCode::BAD_REQUEST,
                AuthError::WaitlistRequired => StatusCode::FORBIDDEN,
                AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::Email(_) => StatusCode::BAD_GATEWAY,
                AuthError::TokenIssue(_) | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Campaign(e) => match e {
                CampaignServiceError::Validation(_) | CampaignServiceError::InvalidTransition { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CampaignServiceError::Access(e) => access_status(e),
                CampaignServiceError::HasPledges => StatusCode::CONFLICT,
                CampaignServiceError::UserNotFound => StatusCode::NOT_FOUND,
                CampaignServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Milestone(e) => match e {
                MilestoneError::Validation(_) | MilestoneError::InvalidState(_) => StatusCode::BAD_REQUEST,
                MilestoneError::Access(e) => access_status(e),
                MilestoneError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Reward(e) => match e {
                RewardError::Validation(_) => StatusCode::BAD_REQUEST,
                RewardError::Access(e) => access_status(e),
                RewardError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Checkout(e) => match e {
                CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
                CheckoutError::Access(e) => access_status(e),
                CheckoutError::Payment(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Webhook(e) => match e {
                WebhookError::InvalidSignature(_) | WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
                WebhookError::MissingSecret => StatusCode::SERVICE_UNAVAILABLE,
                WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Refund(e) => match e {
                RefundError::Validation(_) | RefundError::NotRefundable(_) => StatusCode::BAD_REQUEST,
                RefundError::Access(e) => access_status(e),
                RefundError::ExceedsRemaining { .. } => StatusCode::CONFLICT,
                RefundError::PaymentsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                RefundError::Payment(_) => StatusCode::BAD_GATEWAY,
                RefundError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Waitlist(e) => match e {
                WaitlistError::Validation(_) => StatusCode::BAD_REQUEST,
                WaitlistError::Access(e) => access_status(e),
                WaitlistError::AlreadyJoined => StatusCode::CONFLICT,
                WaitlistError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Marketplace(e) => match e {
                MarketplaceError::Validation(_) => StatusCode::BAD_REQUEST,
                MarketplaceError::Access(e) => access_status(e),
                MarketplaceError::DuplicateCategory | MarketplaceError::CategoryInUse(_) => {
                    StatusCode::CONFLICT
                }
                MarketplaceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Admin(e) => match e {
                AdminError::Validation(_) => StatusCode::BAD_REQUEST,
                AdminError::Access(e) => access_status(e),
                AdminError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Content(e) => match e {
                ContentError::Validation(_) | ContentError::NoRepositoryContent => StatusCode::BAD_REQUEST,
                ContentError::Access(e) => access_status(e),
                ContentError::Ai(_) | ContentError::Source(_) => StatusCode::BAD_GATEWAY,
                ContentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            ApiError::Validation(e)
            | ApiError::Auth(AuthError::Validation(e))
            | ApiError::Campaign(CampaignServiceError::Validation(e))
            | ApiError::Milestone(MilestoneError::Validation(e))
            | ApiError::Reward(RewardError::Validation(e))
            | ApiError::Checkout(CheckoutError::Validation(e))
            | ApiError::Refund(RefundError::Validation(e))
            | ApiError::Waitlist(WaitlistError::Validation(e))
            | ApiError::Marketplace(MarketplaceError::Validation(e))
            | ApiError::Admin(AdminError::Validation(e))
            | ApiError::Content(ContentError::Validation(e)) => Some(e),
            _ => None,
        }
    }

    /// Short machine-readable tag for clients that branch on the failure kind.
    fn kind(&self) -> &'static str {
        if self.validation().is_some() {
            return "validation";
        }
        match self {
            ApiError::Auth(AuthError::WaitlistRequired) => "waitlist",
            _ => match self.status() {
                StatusCode::UNAUTHORIZED => "unauthorized",
                StatusCode::FORBIDDEN => "forbidden",
                StatusCode::NOT_FOUND => "not_found",
                StatusCode::CONFLICT => "conflict",
                StatusCode::TOO_MANY_REQUESTS => "rate_limited",
                StatusCode::BAD_GATEWAY => "upstream",
                StatusCode::SERVICE_UNAVAILABLE => "unavailable",
                StatusCode::INTERNAL_SERVER_ERROR => "internal",
                _ => "bad_request",
            },
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetails {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<std::collections::BTreeMap<String, String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(status = status.as_u16(), error = %self, "Request failed");
            match status {
                StatusCode::BAD_GATEWAY => "An upstream service failed, please try again".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let details = ErrorDetails {
            kind: self.kind(),
            fields: self.validation().map(|e| e.fields.clone()),
        };
        let body = ApiResponse::<(), ErrorDetails>::error_with_data(&message, details);
        (status, ResponseJson(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use db::models::{campaign::CampaignStatus, milestone::MilestoneStatus};
    use services::services::campaigns::CampaignAction;

    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ValidationErrors::single("email", "required").into(), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AccessError::Forbidden("nope").into(), StatusCode::FORBIDDEN),
            (
                MilestoneError::Access(AccessError::NotFound("milestone")).into(),
                StatusCode::NOT_FOUND,
            ),
            (CampaignServiceError::HasPledges.into(), StatusCode::CONFLICT),
            (
                CampaignServiceError::InvalidTransition {
                    action: CampaignAction::Publish,
                    status: CampaignStatus::Live,
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                RefundError::ExceedsRemaining {
                    requested: 2,
                    remaining: 1,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (MilestoneError::InvalidState(MilestoneStatus::Accepted).into(), StatusCode::BAD_REQUEST),
            (WaitlistError::AlreadyJoined.into(), StatusCode::CONFLICT),
            (AuthError::WaitlistRequired.into(), StatusCode::FORBIDDEN),
            (ApiError::Unavailable("payments"), StatusCode::SERVICE_UNAVAILABLE),
            (RefundError::PaymentsUnavailable.into(), StatusCode::SERVICE_UNAVAILABLE),
            (sqlx::Error::RowNotFound.into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err:?}");
        }
    }

    #[test]
    fn validation_errors_expose_fields() {
        let err: ApiError = CampaignServiceError::Validation(ValidationErrors::single("title", "required")).into();
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.validation().unwrap().fields["title"], "required");
        assert_eq!(ApiError::from(AuthError::WaitlistRequired).kind(), "waitlist");
    }
}
