use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::{
    campaign::{Campaign, CampaignWithFunding, CreateCampaign, UpdateCampaign},
    campaign_update::{CampaignUpdate, CreateCampaignUpdate},
    user::User,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::campaigns::{CampaignAction, CampaignDetail, CampaignService};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, MaybeUser, Path, Query},
};

#[derive(Debug, Default, Deserialize)]
pub struct CampaignListQuery {
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize, Serialize, TS)]
pub struct TransitionCampaign {
    pub action: CampaignAction,
}

#[derive(Debug, Deserialize, Serialize, TS)]
pub struct AddTeamMember {
    pub email: String,
}

fn campaign_service(deployment: &DeploymentImpl) -> CampaignService {
    CampaignService::new(
        deployment.db().pool.clone(),
        deployment.email(),
        deployment.app_base_url(),
    )
}

/// GET /api/campaigns
/// Public campaigns, or every campaign the caller can edit with `?mine=true`.
pub async fn list_campaigns(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<CampaignListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<CampaignWithFunding>>>, ApiError> {
    if query.mine && viewer.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let campaigns = campaign_service(&deployment)
        .list(viewer.as_ref(), query.mine)
        .await?;
    Ok(ResponseJson(ApiResponse::success(campaigns)))
}

pub async fn create_campaign(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateCampaign>,
) -> Result<ResponseJson<ApiResponse<Campaign>>, ApiError> {
    let campaign = campaign_service(&deployment).create(&user, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(campaign)))
}

pub async fn get_campaign(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<CampaignDetail>>, ApiError> {
    let detail = campaign_service(&deployment)
        .get(campaign_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(detail)))
}

pub async fn update_campaign(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<UpdateCampaign>,
) -> Result<ResponseJson<ApiResponse<Campaign>>, ApiError> {
    let campaign = campaign_service(&deployment)
        .update(&user, campaign_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(campaign)))
}

/// DELETE /api/campaigns/{campaign_id}
/// Refused once the campaign has pledges.
pub async fn delete_campaign(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    campaign_service(&deployment).delete(&user, campaign_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/campaigns/{campaign_id}/transition
pub async fn transition_campaign(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<TransitionCampaign>,
) -> Result<ResponseJson<ApiResponse<Campaign>>, ApiError> {
    let campaign = campaign_service(&deployment)
        .transition(&user, campaign_id, payload.action)
        .await?;
    Ok(ResponseJson(ApiResponse::success(campaign)))
}

pub async fn add_team_member(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<AddTeamMember>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    let team = campaign_service(&deployment)
        .add_team_member(&user, campaign_id, &payload.email)
        .await?;
    Ok(ResponseJson(ApiResponse::success(team)))
}

pub async fn remove_team_member(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((campaign_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    let team = campaign_service(&deployment)
        .remove_team_member(&user, campaign_id, member_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(team)))
}

pub async fn list_updates(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<CampaignUpdate>>>, ApiError> {
    let updates = campaign_service(&deployment)
        .list_updates(campaign_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(updates)))
}

/// POST /api/campaigns/{campaign_id}/updates
/// Backers who opted in are emailed the update.
pub async fn post_update(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<CreateCampaignUpdate>,
) -> Result<ResponseJson<ApiResponse<CampaignUpdate>>, ApiError> {
    let update = campaign_service(&deployment)
        .post_update(&user, campaign_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(update)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let campaign_router = Router::new()
        .route("/", get(get_campaign).put(update_campaign).delete(delete_campaign))
        .route("/transition", post(transition_campaign))
        .route("/team", post(add_team_member))
        .route("/team/{member_id}", delete(remove_team_member))
        .route("/updates", get(list_updates).post(post_update));

    Router::new().nest(
        "/campaigns",
        Router::new()
            .route("/", get(list_campaigns).post(create_campaign))
            .nest("/{campaign_id}", campaign_router),
    )
}
