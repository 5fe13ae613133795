use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::milestone::{CreateMilestone, Milestone, UpdateMilestone};
use deployment::Deployment;
use services::services::milestones::{MilestoneService, RejectMilestone, SubmitMilestone};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, MaybeUser, Path},
};

pub(crate) fn milestone_service(deployment: &DeploymentImpl) -> MilestoneService {
    MilestoneService::new(
        deployment.db().pool.clone(),
        deployment.config().milestone_review_days,
    )
}

pub async fn list_milestones(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Milestone>>>, ApiError> {
    let milestones = milestone_service(&deployment)
        .list(campaign_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestones)))
}

pub async fn create_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<CreateMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let milestone = milestone_service(&deployment)
        .create(&user, campaign_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn update_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let milestone = milestone_service(&deployment)
        .update(&user, campaign_id, milestone_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn delete_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, milestone_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    milestone_service(&deployment)
        .delete(&user, campaign_id, milestone_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/campaigns/{campaign_id}/milestones/{milestone_id}/submit
/// Opens the review window.
pub async fn submit_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SubmitMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let milestone = milestone_service(&deployment)
        .submit(&user, campaign_id, milestone_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn accept_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, milestone_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let milestone = milestone_service(&deployment)
        .accept(&user, campaign_id, milestone_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn reject_milestone(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RejectMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let milestone = milestone_service(&deployment)
        .reject(&user, campaign_id, milestone_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/campaigns/{campaign_id}/milestones",
        Router::new()
            .route("/", get(list_milestones).post(create_milestone))
            .route("/{milestone_id}", put(update_milestone).delete(delete_milestone))
            .route("/{milestone_id}/submit", post(submit_milestone))
            .route("/{milestone_id}/accept", post(accept_milestone))
            .route("/{milestone_id}/reject", post(reject_milestone)),
    )
}
