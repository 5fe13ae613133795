use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    organization::{CreateOrganization, Organization, UpdateOrganization},
    organization_service::{CreateOrganizationService, OrganizationService, UpdateOrganizationService},
};
use deployment::Deployment;
use services::services::marketplace::MarketplaceService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, MaybeUser, Path},
};

pub(crate) fn marketplace_service(deployment: &DeploymentImpl) -> MarketplaceService {
    MarketplaceService::new(deployment.db().pool.clone())
}

/// POST /api/organizations
/// New organizations wait for admin review.
pub async fn create_organization(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateOrganization>,
) -> Result<ResponseJson<ApiResponse<Organization>>, ApiError> {
    let organization = marketplace_service(&deployment)
        .create_organization(&user, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(organization)))
}

pub async fn my_organizations(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<Organization>>>, ApiError> {
    let organizations = marketplace_service(&deployment).my_organizations(&user).await?;
    Ok(ResponseJson(ApiResponse::success(organizations)))
}

pub async fn get_organization(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Organization>>, ApiError> {
    let organization = marketplace_service(&deployment)
        .get_organization(organization_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(organization)))
}

pub async fn update_organization(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<UpdateOrganization>,
) -> Result<ResponseJson<ApiResponse<Organization>>, ApiError> {
    let organization = marketplace_service(&deployment)
        .update_organization(&user, organization_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(organization)))
}

pub async fn list_services(
    State(deployment): State<DeploymentImpl>,
    MaybeUser(viewer): MaybeUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<OrganizationService>>>, ApiError> {
    let services = marketplace_service(&deployment)
        .list_services(organization_id, viewer.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(services)))
}

pub async fn create_service(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<CreateOrganizationService>,
) -> Result<ResponseJson<ApiResponse<OrganizationService>>, ApiError> {
    let service = marketplace_service(&deployment)
        .create_service(&user, organization_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(service)))
}

pub async fn update_service(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((organization_id, service_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateOrganizationService>,
) -> Result<ResponseJson<ApiResponse<OrganizationService>>, ApiError> {
    let service = marketplace_service(&deployment)
        .update_service(&user, organization_id, service_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(service)))
}

pub async fn delete_service(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path((organization_id, service_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    marketplace_service(&deployment)
        .delete_service(&user, organization_id, service_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let organization_router = Router::new()
        .route("/", get(get_organization).put(update_organization))
        .route("/services", get(list_services).post(create_service))
        .route("/services/{service_id}", put(update_service).delete(delete_service));

    Router::new().nest(
        "/organizations",
        Router::new()
            .route("/", post(create_organization))
            .route("/mine", get(my_organizations))
            .nest("/{organization_id}", organization_router),
    )
}
