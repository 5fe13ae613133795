use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::{
    pledge_tier::{CreatePledgeTier, PledgeTier, UpdatePledgeTier},
    stretch_goal::{CreateStretchGoal, StretchGoal, StretchGoalProgress, UpdateStretchGoal},
};
use deployment::Deployment;
use services::services::rewards::RewardService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, MaybeUser, Path},
};

fn reward_service(deployment: &DeploymentImpl) -> RewardService {
    RewardService::new(deployment.db().pool.clone())
}

pub async fn list_tiers(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<PledgeTier>>>, ApiError> {
    let tiers = reward_service(&deployment)
        .list_tiers(campaign_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(tiers)))
}

pub async fn create_tier(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<CreatePledgeTier>,
) -> Result<ResponseJson<ApiResponse<PledgeTier>>, ApiError> {
    let tier = reward_service(&deployment)
        .create_tier(&user, campaign_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tier)))
}

pub async fn update_tier(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, tier_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePledgeTier>,
) -> Result<ResponseJson<ApiResponse<PledgeTier>>, ApiError> {
    let tier = reward_service(&deployment)
        .update_tier(&user, campaign_id, tier_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(tier)))
}

pub async fn delete_tier(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, tier_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    reward_service(&deployment)
        .delete_tier(&user, campaign_id, tier_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// GET /api/campaigns/{campaign_id}/stretch-goals
/// Each goal carries whether net funds have reached it.
pub async fn list_stretch_goals(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<StretchGoalProgress>>>, ApiError> {
    let goals = reward_service(&deployment)
        .list_stretch_goals(campaign_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(goals)))
}

pub async fn create_stretch_goal(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<CreateStretchGoal>,
) -> Result<ResponseJson<ApiResponse<StretchGoal>>, ApiError> {
    let goal = reward_service(&deployment)
        .create_stretch_goal(&user, campaign_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(goal)))
}

pub async fn update_stretch_goal(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, goal_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateStretchGoal>,
) -> Result<ResponseJson<ApiResponse<StretchGoal>>, ApiError> {
    let goal = reward_service(&deployment)
        .update_stretch_goal(&user, campaign_id, goal_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(goal)))
}

pub async fn delete_stretch_goal(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, goal_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    reward_service(&deployment)
        .delete_stretch_goal(&user, campaign_id, goal_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .nest(
            "/campaigns/{campaign_id}/pledge-tiers",
            Router::new()
                .route("/", get(list_tiers).post(create_tier))
                .route("/{tier_id}", put(update_tier).delete(delete_tier)),
        )
        .nest(
            "/campaigns/{campaign_id}/stretch-goals",
            Router::new()
                .route("/", get(list_stretch_goals).post(create_stretch_goal))
                .route("/{goal_id}", put(update_stretch_goal).delete(delete_stretch_goal)),
        )
}
