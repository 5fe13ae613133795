use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use db::models::refund::Refund;
use deployment::Deployment;
use services::services::refunds::{CreateRefund, RefundService};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, extractors::{CurrentUser, Json, Path}};

pub(crate) fn refund_service(deployment: &DeploymentImpl) -> RefundService {
    RefundService::new(deployment.db().pool.clone())
}

/// POST /api/pledges/{pledge_id}/refunds
/// Without an amount the whole refundable remainder is refunded.
pub async fn create_refund(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(pledge_id): Path<Uuid>,
    Json(payload): Json<CreateRefund>,
) -> Result<ResponseJson<ApiResponse<Refund>>, ApiError> {
    let payments = deployment.payments().ok_or(ApiError::Unavailable("payments"))?;
    let refund = refund_service(&deployment)
        .with_payments(payments)
        .create_refund(&user, pledge_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(refund)))
}

pub async fn list_refunds(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(pledge_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Refund>>>, ApiError> {
    let refunds = refund_service(&deployment)
        .list_for_pledge(&user, pledge_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(refunds)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().route(
        "/pledges/{pledge_id}/refunds",
        get(list_refunds).post(create_refund),
    )
}
