//! A TLS acceptor that surfaces the verified client certificate chain.
//!
//! [`axum_server`] completes the TLS handshake before the router ever sees a
//! request, so handler-level decisions about the peer (the administrative
//! unseal path) need the handshake result forwarded. This acceptor wraps the
//! stock rustls acceptor and layers a [`PeerIdentity`] extension onto the
//! connection's service, making the chain available to every request on the
//! connection.

use std::{io, sync::Arc};

use axum::{middleware::AddExtension, Extension};
use axum_server::{
    accept::Accept,
    tls_rustls::{RustlsAcceptor, RustlsConfig},
};
use futures::future::BoxFuture;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tower::Layer;

/// The peer's verified client certificate chain, present in the request
/// extensions of every request arriving over TLS. The chain is empty when
/// the client presented no certificate; when non-empty, the configured
/// client-CA verifier has already validated it during the handshake.
#[derive(Clone, Debug, Default)]
pub struct PeerIdentity {
    pub verified_chain: Arc<Vec<CertificateDer<'static>>>,
}

impl PeerIdentity {
    pub fn has_verified_chain(&self) -> bool {
        !self.verified_chain.is_empty()
    }
}

/// [`RustlsAcceptor`] plus the [`PeerIdentity`] extension.
#[derive(Clone)]
pub struct ClientCertAcceptor {
    inner: RustlsAcceptor,
}

impl ClientCertAcceptor {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        let inner = RustlsAcceptor::new(RustlsConfig::from_config(config));
        Self { inner }
    }
}

impl<I, S> Accept<I, S> for ClientCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = tokio_rustls::server::TlsStream<I>;
    type Service = AddExtension<S, PeerIdentity>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();

        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;

            let (_io, connection) = stream.get_ref();
            let verified_chain = connection
                .peer_certificates()
                .map(|certs| certs.to_vec())
                .unwrap_or_default();
            let identity = PeerIdentity {
                verified_chain: Arc::new(verified_chain),
            };

            let service = Extension(identity).layer(service);
            Ok((stream, service))
        })
    }
}
