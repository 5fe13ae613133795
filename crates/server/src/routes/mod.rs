use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use deployment::Deployment;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::DeploymentImpl;

pub mod admin;
pub mod ai;
pub mod auth;
pub mod campaigns;
pub mod checkout;
pub mod health;
pub mod marketplace;
pub mod milestones;
pub mod organizations;
pub mod refunds;
pub mod rewards;
pub mod users;
pub mod waitlist;
pub mod webhooks;

fn cors(deployment: &DeploymentImpl) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);
    match deployment.app_base_url().parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            warn!(error = %e, "APP_BASE_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(health::router(&deployment))
        .merge(auth::router(&deployment))
        .merge(users::router(&deployment))
        .merge(campaigns::router(&deployment))
        .merge(milestones::router(&deployment))
        .merge(rewards::router(&deployment))
        .merge(checkout::router(&deployment))
        .merge(webhooks::router(&deployment))
        .merge(refunds::router(&deployment))
        .merge(waitlist::router(&deployment))
        .merge(organizations::router(&deployment))
        .merge(marketplace::router(&deployment))
        .merge(ai::router(&deployment))
        .merge(admin::router(&deployment));

    Router::new()
        .nest("/api", api)
        .layer(cors(&deployment))
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
