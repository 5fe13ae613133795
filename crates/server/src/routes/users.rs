use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    pledge::{BackerPledge, Pledge},
    user::User,
    user_settings::{UpdateUserSettings, UserSettings},
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::{access::AccessError, validation::ValidationErrors};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, extractors::{CurrentUser, Json}};

#[derive(Debug, Deserialize, Serialize, TS)]
pub struct UpdateProfile {
    pub name: Option<String>,
}

pub async fn get_profile(CurrentUser(user): CurrentUser) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user))
}

/// PUT /api/users/me
/// An empty name clears it.
pub async fn update_profile(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfile>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let name = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if name.is_some_and(|n| n.chars().count() > 100) {
        return Err(ValidationErrors::single("name", "must be at most 100 characters").into());
    }
    let user = User::update_name(&deployment.db().pool, user.id, name)
        .await?
        .ok_or(AccessError::NotFound("user"))?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn get_settings(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
) -> Result<ResponseJson<ApiResponse<UserSettings>>, ApiError> {
    let settings = UserSettings::find_or_create(&deployment.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

pub async fn update_settings(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateUserSettings>,
) -> Result<ResponseJson<ApiResponse<UserSettings>>, ApiError> {
    let settings = UserSettings::update(&deployment.db().pool, user.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

/// GET /api/users/me/pledges
pub async fn my_pledges(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<BackerPledge>>>, ApiError> {
    let pledges = Pledge::find_by_backer(&deployment.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(pledges)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/users/me",
        Router::new()
            .route("/", get(get_profile).put(update_profile))
            .route("/settings", get(get_settings).put(update_settings))
            .route("/pledges", get(my_pledges)),
    )
}
