//! The administrative unseal path.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use http::StatusCode;
use keywarden_tls::accept::PeerIdentity;
use serde::Deserialize;
use tracing::warn;

use crate::{error::ApiError, state::RuntimeState};

/// Plenty for a passphrase form.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct InjectForm {
    password: String,
}

/// `POST /admin/inject`: deliver the CA passphrase. This is the only path
/// that operates while sealed, and it requires a client certificate chain
/// verified against the configured client-CA bundle during the handshake.
pub async fn inject(
    State(state): State<Arc<RuntimeState>>,
    request: Request,
) -> Response {
    match inject_inner(&state, request).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => err.into_response(),
    }
}

async fn inject_inner(
    state: &RuntimeState,
    request: Request,
) -> Result<(), ApiError> {
    // The acceptor records the handshake result on every TLS connection; a
    // request without it did not arrive over our front door.
    let peer = request
        .extensions()
        .get::<PeerIdentity>()
        .cloned()
        .ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("no TLS connection state"))
        })?;
    if !peer.has_verified_chain() {
        warn!("Unseal attempt without a verified client certificate");
        return Err(ApiError::Forbidden);
    }

    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|err| {
            ApiError::BadRequest(format!("unreadable body: {err}"))
        })?;
    let form: InjectForm =
        serde_urlencoded::from_bytes(&body).map_err(|_| {
            ApiError::BadRequest("missing password field".to_owned())
        })?;

    state.unseal(&form.password)
}
