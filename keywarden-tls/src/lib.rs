//! TLS presets and loaders for the daemon's front door.
//!
//! The front door serves TLS only: minimum version 1.2, AEAD-capable ECDHE
//! suites, key exchange groups ordered to favor higher strength. Client
//! certificates are requested and verified when presented, against the
//! configured client-CA bundle.

pub mod accept;

use std::{
    fs::File,
    io::BufReader,
    path::Path,
    sync::{Arc, LazyLock},
};

use anyhow::{bail, ensure, Context};
/// Allow accessing [`rustls`] via `keywarden_tls::rustls`.
pub use rustls;
use rustls::{
    crypto::CryptoProvider,
    pki_types::{
        CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer,
        PrivateSec1KeyDer,
    },
    server::{danger::ClientCertVerifier, WebPkiClientVerifier},
    RootCertStore, ServerConfig,
};

/// TLS protocol versions offered by the front door: 1.3 and 1.2.
pub static TLS_PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// AEAD-capable ECDHE suites only; rustls always honors the server's
/// preference order, strongest first within each protocol version.
static CIPHER_SUITES: &[rustls::SupportedCipherSuite] = &[
    rustls::crypto::ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
    rustls::crypto::ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
    rustls::crypto::ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// Key exchange groups ordered to favor higher strength.
static KEY_EXCHANGE_GROUPS: &[&dyn rustls::crypto::SupportedKxGroup] = &[
    rustls::crypto::ring::kx_group::SECP384R1,
    rustls::crypto::ring::kx_group::SECP256R1,
    rustls::crypto::ring::kx_group::X25519,
];

/// Our [`CryptoProvider`].
/// Use this instead of [`rustls::crypto::ring::default_provider`].
pub static CRYPTO_PROVIDER: LazyLock<Arc<CryptoProvider>> =
    LazyLock::new(|| {
        let mut provider = rustls::crypto::ring::default_provider();
        CIPHER_SUITES.clone_into(&mut provider.cipher_suites);
        KEY_EXCHANGE_GROUPS.clone_into(&mut provider.kx_groups);
        Arc::new(provider)
    });

/// Build the front door [`ServerConfig`] from the configured certificate,
/// key, and optional client-CA bundle. With a bundle configured, client
/// certificates are requested and verified when presented; connections
/// without one still complete the handshake.
pub fn server_config(
    cert_path: &Path,
    key_path: &Path,
    client_ca_path: Option<&Path>,
) -> anyhow::Result<ServerConfig> {
    let cert_chain = load_pem_certs(cert_path)?;
    let key = load_pem_private_key(key_path)?;

    let builder = ServerConfig::builder_with_provider(CRYPTO_PROVIDER.clone())
        .with_protocol_versions(TLS_PROTOCOL_VERSIONS)
        .context("Unsupported protocol versions")?;

    let config = match client_ca_path {
        Some(path) => builder
            .with_client_cert_verifier(client_verifier(path)?)
            .with_single_cert(cert_chain, key),
        None => builder.with_no_client_auth().with_single_cert(cert_chain, key),
    }
    .context("Invalid server certificate or key")?;

    Ok(config)
}

/// A verifier which accepts client certificates signed by the CAs in the
/// PEM bundle at `path`, without requiring that a certificate be presented.
pub fn client_verifier(
    path: &Path,
) -> anyhow::Result<Arc<dyn ClientCertVerifier>> {
    let mut roots = RootCertStore::empty();
    for cert in load_pem_certs(path)? {
        roots
            .add(cert)
            .context("Invalid certificate in client CA bundle")?;
    }

    WebPkiClientVerifier::builder_with_provider(
        Arc::new(roots),
        CRYPTO_PROVIDER.clone(),
    )
    .allow_unauthenticated()
    .build()
    .context("Could not build client certificate verifier")
}

/// Read all certificates from a PEM file.
pub fn load_pem_certs(
    path: &Path,
) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Could not open {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .with_context(|| format!("Invalid PEM in {}", path.display()))?;
    ensure!(!certs.is_empty(), "No certificates in {}", path.display());
    Ok(certs.into_iter().map(CertificateDer::from).collect())
}

/// Read the first private key (PKCS#8, PKCS#1, or SEC1) from a PEM file.
pub fn load_pem_private_key(
    path: &Path,
) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("Could not open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    while let Some(item) = rustls_pemfile::read_one(&mut reader)
        .with_context(|| format!("Invalid PEM in {}", path.display()))?
    {
        match item {
            rustls_pemfile::Item::PKCS8Key(der) =>
                return Ok(PrivatePkcs8KeyDer::from(der).into()),
            rustls_pemfile::Item::RSAKey(der) =>
                return Ok(PrivatePkcs1KeyDer::from(der).into()),
            rustls_pemfile::Item::ECKey(der) =>
                return Ok(PrivateSec1KeyDer::from(der).into()),
            _ => continue,
        }
    }

    bail!("No private key in {}", path.display());
}

#[cfg(test)]
mod test {
    use super::*;

    /// Write a fresh self-signed cert + key pair into `dir`.
    fn write_self_signed(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![
            "localhost".to_owned(),
        ])
        .unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn server_config_without_client_auth() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_self_signed(dir.path());
        server_config(&cert_path, &key_path, None).unwrap();
    }

    #[test]
    fn server_config_with_client_ca() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_self_signed(dir.path());
        // Reuse the server cert as the admin client CA; any valid PEM
        // certificate works as a trust root here.
        server_config(&cert_path, &key_path, Some(&cert_path)).unwrap();
    }

    #[test]
    fn missing_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, _key_path) = write_self_signed(dir.path());
        // A cert file contains no private key.
        assert!(load_pem_private_key(&cert_path).is_err());
    }
}
