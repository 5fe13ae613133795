//! Request extractors for route handlers: sessions, plus body/path/query
//! wrappers whose rejections use the API error envelope.

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    extract::cookie::{Cookie, CookieJar, SameSite},
    headers::{Authorization, authorization::Bearer},
};
use db::models::user::User;
use deployment::Deployment;
use tracing::debug;

use crate::{DeploymentImpl, error::ApiError};

pub const SESSION_COOKIE: &str = "session";

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// Bearer token first, then the session cookie.
async fn session_token(parts: &mut Parts, deployment: &DeploymentImpl) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, deployment).await
    {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// The role comes from the database rather than the token, so a demotion
/// applies to tokens issued before it.
async fn session_user(parts: &mut Parts, deployment: &DeploymentImpl) -> Result<Option<User>, ApiError> {
    let Some(token) = session_token(parts, deployment).await else {
        return Ok(None);
    };
    let claims = match deployment.session_tokens().verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Rejected session token");
            return Ok(None);
        }
    };
    Ok(User::find_by_id(&deployment.db().pool, claims.sub).await?)
}

/// Signed-in user; 401 otherwise.
pub struct CurrentUser(pub User);

impl FromRequestParts<DeploymentImpl> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, deployment: &DeploymentImpl) -> Result<Self, Self::Rejection> {
        session_user(parts, deployment)
            .await?
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Signed-in user when there is one. Invalid tokens read as anonymous.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<DeploymentImpl> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, deployment: &DeploymentImpl) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_user(parts, deployment).await?))
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
