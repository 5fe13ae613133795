use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use deployment::Deployment;
use services::services::checkout::{CheckoutService, CheckoutStarted, StartCheckout};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, extractors::{CurrentUser, Json, Path}};

/// POST /api/campaigns/{campaign_id}/checkout
/// Starts a hosted checkout session. The pledge row is created when the
/// processor reports the completed session.
pub async fn start_checkout(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<StartCheckout>,
) -> Result<ResponseJson<ApiResponse<CheckoutStarted>>, ApiError> {
    let payments = deployment.payments().ok_or(ApiError::Unavailable("payments"))?;
    let service = CheckoutService::new(deployment.db().pool.clone(), payments, deployment.app_base_url());
    let started = service.start_checkout(&user, campaign_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(started)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/campaigns/{campaign_id}/checkout", post(start_checkout))
}
