//! Second-factor enrollment and authentication: the `/u2f/` paths.
//!
//! All four paths require a live session cookie; basic credentials are not
//! accepted here since the ceremony exists to strengthen an established
//! session, not to replace primary authentication.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use webauthn_rs::prelude::{PublicKeyCredential, RegisterPublicKeyCredential};

use crate::{
    error::ApiError,
    handlers::auth::{authenticate, negotiate, WantsHtml},
    state::RuntimeState,
};

/// `GET /u2f/RegisterRequest`: enrollment step 1.
pub async fn register_request(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
) -> Response {
    let result = async {
        state.signer_or_sealed()?;
        let username = authenticate(&state, &headers, false).await?;
        let challenge = state.register_begin(&username)?;
        Ok(Json(challenge).into_response())
    }
    .await;
    negotiate(result, wants_html)
}

/// `POST /u2f/RegisterResponse`: enrollment step 2.
pub async fn register_response(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        state.signer_or_sealed()?;
        let username = authenticate(&state, &headers, false).await?;
        let response: RegisterPublicKeyCredential = parse_json(&body)?;
        state.register_finish(&username, &response)?;
        Ok("success".into_response())
    }
    .await;
    negotiate(result, wants_html)
}

/// `GET /u2f/SignRequest`: authentication step 1.
pub async fn sign_request(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
) -> Response {
    let result = async {
        state.signer_or_sealed()?;
        let username = authenticate(&state, &headers, false).await?;
        let challenge = state.sign_begin(&username)?;
        Ok(Json(challenge).into_response())
    }
    .await;
    negotiate(result, wants_html)
}

/// `POST /u2f/SignResponse`: authentication step 2. A verified response
/// advances the credential's counter on disk before this returns.
pub async fn sign_response(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        state.signer_or_sealed()?;
        let username = authenticate(&state, &headers, false).await?;
        let response: PublicKeyCredential = parse_json(&body)?;
        state.sign_finish(&username, &response)?;
        Ok("success".into_response())
    }
    .await;
    negotiate(result, wants_html)
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        ApiError::BadRequest(format!("malformed ceremony response: {err}"))
    })
}
