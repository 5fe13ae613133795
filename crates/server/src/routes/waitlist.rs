use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use db::models::waitlist::{CreateWaitlistEntry, WaitlistEntry};
use deployment::Deployment;
use services::services::waitlist::WaitlistService;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, extractors::Json};

pub(crate) fn waitlist_service(deployment: &DeploymentImpl) -> WaitlistService {
    WaitlistService::new(
        deployment.db().pool.clone(),
        deployment.email(),
        deployment.app_base_url(),
    )
}

/// POST /api/waitlist
pub async fn join_waitlist(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateWaitlistEntry>,
) -> Result<ResponseJson<ApiResponse<WaitlistEntry>>, ApiError> {
    let entry = waitlist_service(&deployment).join(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route("/waitlist", post(join_waitlist))
}
