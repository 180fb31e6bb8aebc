//! X.509 issuance: CA derivation and client certificates.

use std::time::Duration;

use anyhow::Context;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
    SerialNumber, SubjectPublicKeyInfo,
};
use time::OffsetDateTime;

/// Validity of the self-signed CA certificate. User certificates are
/// short-lived; the CA itself is not.
const CA_CERT_LIFETIME_DAYS: i64 = 10 * 365;

/// Backdate certificates slightly to tolerate modest clock skew.
const VALIDITY_SKEW_SLOP: time::Duration = time::Duration::minutes(5);

pub(crate) struct DerivedCaCert {
    pub params: CertificateParams,
    pub der: Vec<u8>,
    pub pem: String,
}

/// Derive the self-signed CA certificate: CN = host identity, O = realm if
/// set else host identity. Performed once, at the moment the signer becomes
/// unsealed.
pub(crate) fn derive_ca_cert(
    ca_key: &KeyPair,
    host_identity: &str,
    realm: Option<&str>,
) -> anyhow::Result<DerivedCaCert> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, host_identity);
    dn.push(DnType::OrganizationName, realm.unwrap_or(host_identity));
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let now = OffsetDateTime::now_utc();
    params.not_before = now - VALIDITY_SKEW_SLOP;
    params.not_after = now + time::Duration::days(CA_CERT_LIFETIME_DAYS);
    params.serial_number = Some(SerialNumber::from(rand::random::<u64>()));

    let cert = params
        .self_signed(ca_key)
        .context("Could not self-sign the CA certificate")?;

    Ok(DerivedCaCert {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        params,
    })
}

/// Sign a client certificate over a caller-supplied subject-public-key-info
/// PEM. The subject asserts `username`; the realm shapes the subject's
/// organization when present.
pub(crate) fn sign_client_cert(
    ca_params: &CertificateParams,
    ca_key: &KeyPair,
    username: &str,
    realm: Option<&str>,
    pubkey_pem: &str,
    lifetime: Duration,
) -> anyhow::Result<String> {
    let spki = SubjectPublicKeyInfo::from_pem(pubkey_pem)
        .context("Invalid PUBLIC KEY PEM")?;

    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, username);
    if let Some(realm) = realm {
        dn.push(DnType::OrganizationName, realm);
    }
    params.distinguished_name = dn;

    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

    let now = OffsetDateTime::now_utc();
    params.not_before = now - VALIDITY_SKEW_SLOP;
    params.not_after = now
        + time::Duration::try_from(lifetime)
            .context("Certificate lifetime out of range")?;
    params.serial_number = Some(SerialNumber::from(rand::random::<u64>()));

    let issuer = Issuer::from_params(ca_params, ca_key);
    let cert = params
        .signed_by(&spki, &issuer)
        .context("Could not sign the client certificate")?;

    Ok(cert.pem())
}

#[cfg(test)]
mod test {
    use rsa::pkcs8::EncodePublicKey;

    use super::*;
    use crate::test::test_signer;

    fn test_user_pubkey_pem() -> String {
        let key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
            .expect("RSA keygen");
        key.to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .expect("SPKI PEM")
    }

    #[test]
    fn signs_a_client_cert() {
        let signer = test_signer();
        let pubkey_pem = test_user_pubkey_pem();

        let cert_pem = signer.sign_x509_cert("alice", &pubkey_pem).unwrap();
        let (_, parsed) =
            x509_parser::pem::parse_x509_pem(cert_pem.as_bytes()).unwrap();
        let cert = parsed.parse_x509().unwrap();

        assert!(cert.subject().to_string().contains("alice"));
        assert!(cert.issuer().to_string().contains("warden.test"));
        let constraints = cert.basic_constraints().unwrap();
        assert!(constraints.map_or(true, |bc| !bc.value.ca));

        let validity = cert.validity();
        let window = validity.not_after.timestamp()
            - validity.not_before.timestamp();
        assert_eq!(window, 24 * 3600 + 300);
    }

    #[test]
    fn rejects_non_spki_input() {
        let signer = test_signer();
        assert!(signer.sign_x509_cert("alice", "garbage").is_err());
        // An RSA PRIVATE KEY block is not a PUBLIC KEY block.
        assert!(signer
            .sign_x509_cert("alice", &crate::test::TEST_CA_PEM)
            .is_err());
    }
}
