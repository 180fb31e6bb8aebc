//! Request-path error taxonomy and its HTTP mapping.

use axum::response::{IntoResponse, Response};
use http::{header, StatusCode};
use keywarden_common::constants::BASIC_AUTH_REALM;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by request handlers.
///
/// Configuration errors don't appear here; they terminate the process at
/// startup. Upstream failures during primary authentication don't either;
/// those are swallowed per-backend and the outcome is "not valid".
#[derive(Debug, Error)]
pub enum ApiError {
    /// The CA is sealed and this path needs a usable signer.
    #[error("signer is sealed")]
    Sealed,
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    AuthFailure,
    /// Authenticated, but not entitled to the target identity.
    #[error("forbidden")]
    Forbidden,
    /// Malformed input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// External tooling is broken (as opposed to "user has no key").
    #[error("upstream failure: {0}")]
    Upstream(anyhow::Error),
    /// The operation conflicts with current state, e.g. a second unseal.
    #[error("conflict: {0}")]
    Conflict(&'static str),
    /// An invariant was violated.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Sealed | Self::Upstream(_) | Self::Internal(_) =>
                StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuthFailure => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::AuthFailure => (
                status,
                [(
                    header::WWW_AUTHENTICATE,
                    format!("Basic realm=\"{BASIC_AUTH_REALM}\""),
                )],
                "401 Unauthorized\n",
            )
                .into_response(),
            Self::Forbidden => (status, "403 Forbidden\n").into_response(),
            Self::BadRequest(msg) => {
                warn!("Bad request: {msg}");
                (status, format!("400 Bad Request: {msg}\n")).into_response()
            }
            Self::Conflict(msg) => {
                warn!("Conflict: {msg}");
                (status, format!("409 Conflict: {msg}\n")).into_response()
            }
            Self::Sealed => {
                error!("Request rejected: signer is sealed");
                (status, "500 Internal Server Error\n").into_response()
            }
            Self::Upstream(err) | Self::Internal(err) => {
                error!("{err:#}");
                (status, "500 Internal Server Error\n").into_response()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::Sealed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::AuthFailure.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("x".to_owned()).status(),
            StatusCode::BAD_REQUEST,
        );
        assert_eq!(
            ApiError::Conflict("already unsealed").status(),
            StatusCode::CONFLICT,
        );
    }
}
