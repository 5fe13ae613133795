//! Admin console. Every handler requires the admin role, which the services check.

use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    campaign::{CampaignStatus, CampaignWithFunding},
    dispute::Dispute,
    milestone::Milestone,
    organization::{Organization, OrganizationStatus},
    platform_settings::{PlatformSettings, UpdatePlatformSettings},
    refund::Refund,
    service_category::{CreateServiceCategory, ServiceCategory, UpdateServiceCategory},
    user::User,
    waitlist::{WaitlistEntry, WaitlistStatus},
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::{
    access,
    admin::{AdminService, PlatformStats, SetRole, UserPage},
    marketplace::ReviewOrganization,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, Path, Query},
    routes::{
        milestones::milestone_service, organizations::marketplace_service, refunds::refund_service,
        waitlist::waitlist_service,
    },
};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    pub status: Option<S>,
}

fn admin_service(deployment: &DeploymentImpl) -> AdminService {
    AdminService::new(deployment.db().pool.clone())
}

pub async fn get_settings(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<PlatformSettings>>, ApiError> {
    let settings = admin_service(&deployment).settings(&admin).await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

pub async fn update_settings(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Json(payload): Json<UpdatePlatformSettings>,
) -> Result<ResponseJson<ApiResponse<PlatformSettings>>, ApiError> {
    let settings = admin_service(&deployment)
        .update_settings(&admin, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(settings)))
}

pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<ResponseJson<ApiResponse<UserPage>>, ApiError> {
    let users = admin_service(&deployment)
        .list_users(&admin, page.limit, page.offset)
        .await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn set_role(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetRole>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = admin_service(&deployment)
        .set_role(&admin, user_id, payload.role)
        .await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn list_campaigns(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Query(query): Query<StatusQuery<CampaignStatus>>,
) -> Result<ResponseJson<ApiResponse<Vec<CampaignWithFunding>>>, ApiError> {
    let campaigns = admin_service(&deployment)
        .list_campaigns(&admin, query.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(campaigns)))
}

pub async fn stats(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<PlatformStats>>, ApiError> {
    let stats = admin_service(&deployment).stats(&admin).await?;
    Ok(ResponseJson(ApiResponse::success(stats)))
}

pub async fn list_refunds(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Refund>>>, ApiError> {
    let refunds = refund_service(&deployment).list_all(&admin).await?;
    Ok(ResponseJson(ApiResponse::success(refunds)))
}

pub async fn list_disputes(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Dispute>>>, ApiError> {
    let disputes = refund_service(&deployment).list_disputes(&admin).await?;
    Ok(ResponseJson(ApiResponse::success(disputes)))
}

/// GET /api/admin/milestones
/// Milestones waiting for review.
pub async fn list_submitted_milestones(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Milestone>>>, ApiError> {
    let milestones = milestone_service(&deployment).list_submitted(&admin).await?;
    Ok(ResponseJson(ApiResponse::success(milestones)))
}

pub async fn list_waitlist(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Query(query): Query<StatusQuery<WaitlistStatus>>,
) -> Result<ResponseJson<ApiResponse<Vec<WaitlistEntry>>>, ApiError> {
    let entries = waitlist_service(&deployment)
        .list(&admin, query.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub async fn approve_waitlist_entry(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(entry_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<WaitlistEntry>>, ApiError> {
    let entry = waitlist_service(&deployment)
        .decide(&admin, entry_id, true)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub async fn reject_waitlist_entry(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(entry_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<WaitlistEntry>>, ApiError> {
    let entry = waitlist_service(&deployment)
        .decide(&admin, entry_id, false)
        .await?;
    Ok(ResponseJson(ApiResponse::success(entry)))
}

pub async fn list_organizations(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Query(query): Query<StatusQuery<OrganizationStatus>>,
) -> Result<ResponseJson<ApiResponse<Vec<Organization>>>, ApiError> {
    let organizations = marketplace_service(&deployment)
        .list_organizations(&admin, query.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(organizations)))
}

pub async fn review_organization(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<ReviewOrganization>,
) -> Result<ResponseJson<ApiResponse<Organization>>, ApiError> {
    let organization = marketplace_service(&deployment)
        .review_organization(&admin, organization_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(organization)))
}

/// GET /api/admin/categories
/// Includes deactivated categories.
pub async fn list_categories(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<ServiceCategory>>>, ApiError> {
    access::require_admin(&admin)?;
    let categories = marketplace_service(&deployment).list_categories(true).await?;
    Ok(ResponseJson(ApiResponse::success(categories)))
}

pub async fn create_category(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Json(payload): Json<CreateServiceCategory>,
) -> Result<ResponseJson<ApiResponse<ServiceCategory>>, ApiError> {
    let category = marketplace_service(&deployment)
        .create_category(&admin, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(category)))
}

pub async fn update_category(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<UpdateServiceCategory>,
) -> Result<ResponseJson<ApiResponse<ServiceCategory>>, ApiError> {
    let category = marketplace_service(&deployment)
        .update_category(&admin, category_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(category)))
}

/// DELETE /api/admin/categories/{category_id}
/// Refused while listings still use the category.
pub async fn delete_category(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(admin): CurrentUser,
    Path(category_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    marketplace_service(&deployment)
        .delete_category(&admin, category_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route("/settings", get(get_settings).put(update_settings))
            .route("/users", get(list_users))
            .route("/users/{user_id}/role", put(set_role))
            .route("/campaigns", get(list_campaigns))
            .route("/stats", get(stats))
            .route("/refunds", get(list_refunds))
            .route("/disputes", get(list_disputes))
            .route("/milestones", get(list_submitted_milestones))
            .route("/waitlist", get(list_waitlist))
            .route("/waitlist/{entry_id}/approve", post(approve_waitlist_entry))
            .route("/waitlist/{entry_id}/reject", post(reject_waitlist_entry))
            .route("/organizations", get(list_organizations))
            .route("/organizations/{organization_id}/review", post(review_organization))
            .route("/categories", get(list_categories).post(create_category))
            .route("/categories/{category_id}", put(update_category).delete(delete_category)),
    )
}
