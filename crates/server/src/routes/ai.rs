use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use deployment::Deployment;
use services::services::content_generator::{
    CampaignDraft, ContentGenerator, EnhanceContentRequest, EnhancedContent, GapAnalysis,
    GapAnalysisRequest, GenerateCampaignRequest, StretchGoalSuggestion,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, extractors::{CurrentUser, Json, Path}};

fn content_generator(deployment: &DeploymentImpl) -> Result<ContentGenerator, ApiError> {
    let model = deployment
        .completion_model()
        .ok_or(ApiError::Unavailable("AI content generation"))?;
    Ok(ContentGenerator::new(
        deployment.db().pool.clone(),
        model,
        deployment.source_host(),
    ))
}

/// POST /api/ai/enhance
pub async fn enhance_content(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<EnhanceContentRequest>,
) -> Result<ResponseJson<ApiResponse<EnhancedContent>>, ApiError> {
    let enhanced = content_generator(&deployment)?.enhance_content(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(enhanced)))
}

/// POST /api/ai/generate-campaign
/// Drafts a campaign from the repository README and docs. Nothing is saved.
pub async fn generate_campaign(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<GenerateCampaignRequest>,
) -> Result<ResponseJson<ApiResponse<CampaignDraft>>, ApiError> {
    let draft = content_generator(&deployment)?.generate_campaign(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(draft)))
}

/// POST /api/ai/gap-analysis
pub async fn gap_analysis(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<GapAnalysisRequest>,
) -> Result<ResponseJson<ApiResponse<GapAnalysis>>, ApiError> {
    let analysis = content_generator(&deployment)?.gap_analysis(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(analysis)))
}

pub async fn suggest_stretch_goals(
    State(deployment): State<DeploymentImpl>,
    CurrentUser(user): CurrentUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<StretchGoalSuggestion>>>, ApiError> {
    let suggestions = content_generator(&deployment)?
        .suggest_stretch_goals(&user, campaign_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(suggestions)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .nest(
            "/ai",
            Router::new()
                .route("/enhance", post(enhance_content))
                .route("/generate-campaign", post(generate_campaign))
                .route("/gap-analysis", post(gap_analysis)),
        )
        .route(
            "/campaigns/{campaign_id}/stretch-goal-suggestions",
            post(suggest_stretch_goals),
        )
}
