//! Serving: TLS bind, graceful shutdown.

use std::{net::TcpListener, sync::Arc, time::Duration};

use anyhow::Context;
use keywarden_common::shutdown::ShutdownChannel;
use keywarden_tls::accept::ClientCertAcceptor;
use tracing::info;

use crate::{handlers, state::RuntimeState};

/// Grace period during which new connections are refused and existing ones
/// may finish before the hard shutdown.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Bind the TLS listener and serve the front door until shutdown.
///
/// Errors on a bad TLS configuration or an unavailable bind address; both
/// terminate the process from `main`.
pub async fn serve(
    state: Arc<RuntimeState>,
    mut shutdown: ShutdownChannel,
) -> anyhow::Result<()> {
    let tls_config = keywarden_tls::server_config(
        &state.config.base.tls_cert_filename,
        &state.config.base.tls_key_filename,
        state.config.base.client_ca_filename.as_deref(),
    )
    .context("Could not build the TLS configuration")?;

    let bind_addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(bind_addr)
        .with_context(|| format!("Could not bind {bind_addr}"))?;
    info!("Listening on https://{bind_addr}");

    let acceptor = ClientCertAcceptor::new(Arc::new(tls_config));
    let router = handlers::router(state);
    let handle = axum_server::Handle::new();

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.recv().await;
        info!("Shutting down the API server");
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
    });

    axum_server::from_tcp(listener)
        .acceptor(acceptor)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .context("Server error")
}
