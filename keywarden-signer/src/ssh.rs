//! OpenSSH user certificate issuance.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use ssh_key::{certificate, public::PublicKey, rand_core::OsRng};

/// Extensions granted on issued user certificates; the stock OpenSSH
/// permit set.
const USER_CERT_EXTENSIONS: &[&str] = &[
    "permit-X11-forwarding",
    "permit-agent-forwarding",
    "permit-port-forwarding",
    "permit-pty",
    "permit-user-rc",
];

/// Slop subtracted from the validity start to tolerate modest clock skew
/// between us and the consuming sshd.
const VALIDITY_SKEW_SLOP: Duration = Duration::from_secs(300);

pub(crate) fn sign_user_cert(
    ca_key: &ssh_key::PrivateKey,
    username: &str,
    host_identity: &str,
    public_key_text: &str,
    lifetime: Duration,
) -> anyhow::Result<String> {
    let public_key = PublicKey::from_openssh(public_key_text.trim())
        .context("Invalid OpenSSH public key")?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the epoch")?
        .as_secs();
    let valid_after = now.saturating_sub(VALIDITY_SKEW_SLOP.as_secs());
    let valid_before = now + lifetime.as_secs();

    let mut builder = certificate::Builder::new_with_random_nonce(
        &mut OsRng,
        public_key.key_data().clone(),
        valid_after,
        valid_before,
    )
    .context("Could not start the certificate builder")?;
    builder.serial(rand::random::<u64>())?;
    builder.cert_type(certificate::CertType::User)?;
    builder.key_id(format!("{host_identity}_{username}"))?;
    builder.valid_principal(username)?;
    for extension in USER_CERT_EXTENSIONS {
        builder.extension(*extension, "")?;
    }
    builder.comment(username)?;

    let cert = builder
        .sign(ca_key)
        .context("Could not sign the user certificate")?;
    cert.to_openssh()
        .context("Could not serialize the user certificate")
}

#[cfg(test)]
mod test {
    use ssh_key::{certificate::Certificate, Algorithm};

    use super::*;
    use crate::test::test_signer;

    fn test_user_key() -> String {
        let key = ssh_key::PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .expect("ed25519 keygen");
        key.public_key().to_openssh().expect("openssh encoding")
    }

    #[test]
    fn signs_a_user_cert() {
        let signer = test_signer();
        let user_key = test_user_key();

        let cert_text = signer.sign_ssh_cert("alice", &user_key).unwrap();
        let cert = Certificate::from_openssh(&cert_text).unwrap();

        assert_eq!(cert.cert_type(), certificate::CertType::User);
        assert_eq!(cert.valid_principals(), ["alice".to_owned()]);
        assert_eq!(cert.key_id(), "warden.test_alice");
        // ~24h window plus the skew slop at the front.
        let window = cert.valid_before() - cert.valid_after();
        assert_eq!(window, 24 * 3600 + VALIDITY_SKEW_SLOP.as_secs());
        // The serialized form carries the permit set.
        assert!(cert_text.contains("cert-v01@openssh.com"));
    }

    #[test]
    fn rejects_garbage_public_key() {
        let signer = test_signer();
        assert!(signer.sign_ssh_cert("alice", "not a key").is_err());
    }
}
