//! Certificate issuance: `/certgen/{username}`.

use std::sync::{Arc, LazyLock};

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Multipart, Path, RawQuery, State},
    response::Response,
};
use http::{header, HeaderMap, StatusCode};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::ApiError,
    handlers::auth::{authenticate, negotiate, WantsHtml},
    keylookup::KeyLookupOutcome,
    state::RuntimeState,
};

/// Shape a submitted SSH public key must match: key type, base64 blob,
/// optional short comment.
static SSH_PUBKEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(ssh-rsa|ssh-dss|ecdsa-sha2-nistp256|ssh-ed25519) [a-zA-Z0-9/+]+=?=? ?.{0,512}\n?$",
    )
    .expect("static regex")
});

#[derive(Default, Deserialize)]
struct CertgenQuery {
    #[serde(default, rename = "type")]
    cert_type: Option<String>,
}

/// `GET /certgen/{username}`: issue an SSH certificate over the user's
/// published public key, fetched via the external key lookup.
pub async fn issue_get(
    State(state): State<Arc<RuntimeState>>,
    Path(username): Path<String>,
    WantsHtml(wants_html): WantsHtml,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let result = issue_get_inner(&state, &username, query, &headers).await;
    negotiate(result, wants_html)
}

async fn issue_get_inner(
    state: &RuntimeState,
    username: &str,
    query: Option<String>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let signer = state.signer_or_sealed()?;
    let auth_user = authenticate(state, headers, true).await?;
    // Byte-exact: the path suffix must equal the authenticated identity.
    if auth_user != username {
        return Err(ApiError::Forbidden);
    }

    match query_cert_type(query.as_deref())?.as_str() {
        "ssh" => {
            let key = match state
                .key_lookup
                .fetch(username)
                .await
                .map_err(ApiError::Upstream)?
            {
                KeyLookupOutcome::Found(key) => key,
                KeyLookupOutcome::NotFound =>
                    return Err(ApiError::BadRequest(format!(
                        "no published public key for {username}"
                    ))),
            };
            let cert = signer
                .sign_ssh_cert(username, &key)
                .context("SSH signing failed")?;
            info!("Issued an SSH certificate for {username}");
            Ok(attachment_response("id_rsa-cert.pub", cert))
        }
        "x509" => Err(ApiError::BadRequest(
            "x509 issuance requires a POSTed public key".to_owned(),
        )),
        other => Err(ApiError::BadRequest(format!(
            "unknown certificate type: {other}"
        ))),
    }
}

/// `POST /certgen/{username}`: issue an SSH or X.509 certificate over a
/// caller-supplied public key, submitted as the multipart form field
/// `pubkeyfile`.
pub async fn issue_post(
    State(state): State<Arc<RuntimeState>>,
    Path(username): Path<String>,
    WantsHtml(wants_html): WantsHtml,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let result =
        issue_post_inner(&state, &username, query, &headers, multipart).await;
    negotiate(result, wants_html)
}

async fn issue_post_inner(
    state: &RuntimeState,
    username: &str,
    query: Option<String>,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let signer = state.signer_or_sealed()?;
    let auth_user = authenticate(state, headers, true).await?;
    if auth_user != username {
        return Err(ApiError::Forbidden);
    }

    let mut cert_type = query_cert_type(query.as_deref())?;
    let mut pubkey: Option<String> = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::BadRequest(format!("malformed multipart body: {err}"))
    })? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("type") => {
                cert_type = field.text().await.map_err(|err| {
                    ApiError::BadRequest(format!("bad type field: {err}"))
                })?;
            }
            Some("pubkeyfile") => {
                pubkey = Some(field.text().await.map_err(|err| {
                    ApiError::BadRequest(format!("bad pubkeyfile field: {err}"))
                })?);
            }
            _ => continue,
        }
    }

    let pubkey = pubkey.ok_or_else(|| {
        ApiError::BadRequest("missing pubkeyfile field".to_owned())
    })?;

    match cert_type.as_str() {
        "ssh" => {
            if !SSH_PUBKEY_RE.is_match(&pubkey) {
                return Err(ApiError::BadRequest(
                    "submitted file is not an SSH public key".to_owned(),
                ));
            }
            let cert = signer
                .sign_ssh_cert(username, &pubkey)
                .context("SSH signing failed")?;
            info!("Issued an SSH certificate for {username}");
            Ok(attachment_response("id_rsa-cert.pub", cert))
        }
        "x509" => {
            if !pubkey.contains("-----BEGIN PUBLIC KEY-----") {
                return Err(ApiError::BadRequest(
                    "submitted file is not a PUBLIC KEY PEM".to_owned(),
                ));
            }
            let cert = signer
                .sign_x509_cert(username, &pubkey)
                .map_err(|err| ApiError::BadRequest(format!(
                    "could not sign the submitted key: {err:#}"
                )))?;
            info!("Issued an X.509 certificate for {username}");
            Ok(attachment_response("userCert.pem", cert))
        }
        other => Err(ApiError::BadRequest(format!(
            "unknown certificate type: {other}"
        ))),
    }
}

/// The `type` form parameter; `ssh` when absent.
fn query_cert_type(query: Option<&str>) -> Result<String, ApiError> {
    let parsed: CertgenQuery = serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|err| {
            ApiError::BadRequest(format!("bad query string: {err}"))
        })?;
    Ok(parsed.cert_type.unwrap_or_else(|| "ssh".to_owned()))
}

fn attachment_response(filename: &str, body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(body))
        .expect("static response")
}
