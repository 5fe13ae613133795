use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use db::models::user::User;
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::auth::{AuthService, SignedIn};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extractors::{CurrentUser, Json, expired_session_cookie, session_cookie},
};

#[derive(Debug, Deserialize, Serialize, TS)]
pub struct RequestCode {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, TS)]
pub struct VerifyCode {
    pub email: String,
    pub code: String,
}

fn auth_service(deployment: &DeploymentImpl) -> AuthService {
    AuthService::new(
        deployment.db().pool.clone(),
        deployment.email(),
        deployment.session_tokens().clone(),
    )
}

/// POST /api/auth/request-code
pub async fn request_code(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RequestCode>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    auth_service(&deployment).request_code(&payload.email).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/auth/verify
/// Returns the token and also sets it as the session cookie.
pub async fn verify_code(
    State(deployment): State<DeploymentImpl>,
    jar: CookieJar,
    Json(payload): Json<VerifyCode>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<SignedIn>>), ApiError> {
    let signed_in = auth_service(&deployment)
        .verify_code(&payload.email, &payload.code)
        .await?;
    let secure = deployment.app_base_url().starts_with("https://");
    let jar = jar.add(session_cookie(signed_in.token.clone(), secure));
    Ok((jar, ResponseJson(ApiResponse::success(signed_in))))
}

/// GET /api/auth/me
pub async fn me(CurrentUser(user): CurrentUser) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, ResponseJson<ApiResponse<()>>) {
    (jar.remove(expired_session_cookie()), ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/request-code", post(request_code))
            .route("/verify", post(verify_code))
            .route("/me", get(me))
            .route("/logout", post(logout)),
    )
}
