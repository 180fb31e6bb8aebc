//! Unauthenticated paths: the login form and the CA certificate.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    response::{Html, IntoResponse, Response},
};
use http::{header, StatusCode};

use crate::{handlers::auth::redirect_found, pages, state::RuntimeState};

/// `GET /`.
pub async fn root(State(state): State<Arc<RuntimeState>>) -> Response {
    match state.signer_or_sealed() {
        Ok(_) => redirect_found("/profile/"),
        Err(err) => err.into_response(),
    }
}

/// `GET /public/loginForm`.
pub async fn login_form(State(state): State<Arc<RuntimeState>>) -> Response {
    match state.signer_or_sealed() {
        Ok(_) => Html(pages::LOGIN_FORM).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /public/x509ca`: the CA certificate as PEM. No authentication, but
/// the CA must be unsealed.
pub async fn x509_ca(State(state): State<Arc<RuntimeState>>) -> Response {
    let signer = match state.signer_or_sealed() {
        Ok(signer) => signer,
        Err(err) => return err.into_response(),
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-pem-file")
        .body(Body::from(signer.ca_cert_pem().to_owned()))
        .expect("static response")
}
