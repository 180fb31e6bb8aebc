//! The credential management page.

use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
};
use http::HeaderMap;

use crate::{
    handlers::auth::{authenticate, negotiate, WantsHtml},
    pages,
    state::RuntimeState,
};

/// `GET /profile/`.
pub async fn show(
    State(state): State<Arc<RuntimeState>>,
    WantsHtml(wants_html): WantsHtml,
    headers: HeaderMap,
) -> Response {
    let result = async {
        state.signer_or_sealed()?;
        let username = authenticate(&state, &headers, false).await?;
        let count = state.credential_count(&username);
        Ok(Html(pages::profile_page(&username, count)).into_response())
    }
    .await;
    negotiate(result, wants_html)
}
