//! Session establishment.

use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    response::{IntoResponse, Response},
};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use keywarden_common::constants::{AUTH_COOKIE_NAME, COOKIE_LIFETIME};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::ApiError,
    handlers::auth::{basic_credentials, negotiate, redirect_found, WantsHtml},
    state::RuntimeState,
};

#[derive(Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// `GET`/`POST /api/v0/login`. Credentials come from the urlencoded body,
/// the query string, or basic auth, in that order. On success a fresh
/// session cookie is set; the response shape follows content negotiation.
pub async fn login(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    let result = login_inner(&state, wants_html, &headers, query, body).await;
    negotiate(result, wants_html)
}

async fn login_inner(
    state: &RuntimeState,
    wants_html: bool,
    headers: &HeaderMap,
    query: Option<String>,
    body: String,
) -> Result<Response, ApiError> {
    let credentials = form_credentials(&body)
        .or_else(|| query.as_deref().and_then(form_credentials))
        .or_else(|| basic_credentials(headers));
    let Some((username, password)) = credentials else {
        return Err(ApiError::AuthFailure);
    };

    if !state.authenticator.verify(&username, &password).await {
        info!("Login failed for {username}");
        return Err(ApiError::AuthFailure);
    }

    // Valid credentials, but no certificate can be issued until the CA is
    // unsealed; only the failure branches above escape the sealed gate.
    state.signer_or_sealed()?;

    let cookie = state.new_session(&username);
    info!("Login succeeded for {username}");

    let mut response = if wants_html {
        redirect_found("/profile/")
    } else {
        (StatusCode::OK, "Success!").into_response()
    };
    let cookie_header = format!(
        "{AUTH_COOKIE_NAME}={cookie}; Path=/; Max-Age={}; HttpOnly; Secure",
        COOKIE_LIFETIME.as_secs(),
    );
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie_header)
            .map_err(|err| ApiError::Internal(err.into()))?,
    );
    Ok(response)
}

fn form_credentials(raw: &str) -> Option<(String, String)> {
    let form: LoginForm = serde_urlencoded::from_str(raw).ok()?;
    (!form.username.is_empty()).then_some((form.username, form.password))
}
