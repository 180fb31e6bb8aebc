//! Caller identity resolution and content negotiation helpers.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    response::{Html, IntoResponse, Response},
};
use base64::Engine;
use http::{header, request::Parts, HeaderMap, StatusCode};
use keywarden_common::constants::AUTH_COOKIE_NAME;

use crate::{error::ApiError, pages, state::RuntimeState};

/// Whether the caller prefers HTML over machine-readable responses,
/// decided by the `Accept` header.
pub struct WantsHtml(pub bool);

impl<S: Send + Sync> FromRequestParts<S> for WantsHtml {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let wants = parts
            .headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false);
        Ok(Self(wants))
    }
}

/// Resolve the caller's identity: session cookie first, then (where
/// allowed) basic credentials verified against the primary authenticator.
pub async fn authenticate(
    state: &RuntimeState,
    headers: &HeaderMap,
    allow_basic: bool,
) -> Result<String, ApiError> {
    if let Some(cookie) = cookie_value(headers) {
        if let Some(username) = state.session_user(&cookie) {
            return Ok(username);
        }
    }

    if allow_basic {
        if let Some((username, password)) = basic_credentials(headers) {
            if state.authenticator.verify(&username, &password).await {
                return Ok(username);
            }
        }
    }

    Err(ApiError::AuthFailure)
}

/// The `auth_cookie` value from the `Cookie` header, if present.
pub fn cookie_value(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == AUTH_COOKIE_NAME).then(|| value.to_owned())
    })
}

/// Username and password from an `Authorization: Basic ..` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// A plain `302 Found` redirect. [`axum::response::Redirect`] only offers
/// 303/307/308; browser-facing login flows here use the classic 302.
pub fn redirect_found(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(axum::body::Body::empty())
        .expect("static response")
}

/// Convert a handler result into a response, honoring content negotiation:
/// an auth failure for a caller that accepts HTML carries the login form
/// instead of the plain-text challenge.
pub fn negotiate(
    result: Result<Response, ApiError>,
    wants_html: bool,
) -> Response {
    match result {
        Ok(response) => response,
        Err(ApiError::AuthFailure) if wants_html =>
            (StatusCode::UNAUTHORIZED, Html(pages::LOGIN_FORM))
                .into_response(),
        Err(err) => err.into_response(),
    }
}
