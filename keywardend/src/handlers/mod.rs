//! The HTTP front door: route table and request handlers.

pub mod admin;
pub mod auth;
pub mod certgen;
pub mod login;
pub mod profile;
pub mod public;
pub mod second_factor;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::RuntimeState;

/// Build the route table. Every path is sealed-gated except
/// `/admin/inject` (which only works while sealed) and the failure
/// branches of `/api/v0/login`.
pub fn router(state: Arc<RuntimeState>) -> Router {
    Router::new()
        .route("/", get(public::root))
        .route(
            "/certgen/{username}",
            get(certgen::issue_get).post(certgen::issue_post),
        )
        .route("/api/v0/login", get(login::login).post(login::login))
        .route("/public/loginForm", get(public::login_form))
        .route("/public/x509ca", get(public::x509_ca))
        .route("/u2f/RegisterRequest", get(second_factor::register_request))
        .route("/u2f/RegisterResponse", post(second_factor::register_response))
        .route("/u2f/SignRequest", get(second_factor::sign_request))
        .route("/u2f/SignResponse", post(second_factor::sign_response))
        .route("/profile/", get(profile::show))
        .route("/admin/inject", post(admin::inject))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
