use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{organization_service::MarketplaceListing, service_category::ServiceCategory};
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl, error::ApiError, extractors::Query, routes::organizations::marketplace_service,
};

#[derive(Debug, Default, Deserialize)]
pub struct MarketplaceQuery {
    /// Category slug.
    pub category: Option<String>,
}

/// GET /api/services
/// Active listings of approved service providers.
pub async fn list_marketplace(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<MarketplaceQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<MarketplaceListing>>>, ApiError> {
    let listings = marketplace_service(&deployment)
        .marketplace(query.category.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(listings)))
}

pub async fn list_categories(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<ServiceCategory>>>, ApiError> {
    let categories = marketplace_service(&deployment).list_categories(false).await?;
    Ok(ResponseJson(ApiResponse::success(categories)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/services", get(list_marketplace))
        .route("/categories", get(list_categories))
}
