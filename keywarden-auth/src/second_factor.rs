//! Hardware-authenticator ceremonies bound to per-user profiles.
//!
//! Both ceremonies are two round trips: the daemon mints a challenge and
//! parks the ceremony state in the user's profile; the next request carries
//! the authenticator's response, which is verified against exactly that
//! state. Pending state is transient: it never reaches disk, is cleared on
//! success, and is overwritten by a re-request.

use anyhow::Context;
use keywarden_common::constants::SECOND_FACTOR_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webauthn_rs::prelude::*;

#[derive(Debug, Error)]
pub enum SecondFactorError {
    /// The user has no registered second factors.
    #[error("no second factors registered")]
    NoCredentials,
    /// The response arrived without a matching outstanding challenge.
    #[error("no pending challenge; request one first")]
    NoPendingChallenge,
    /// The authenticator's response failed verification (bad signature,
    /// wrong challenge, or a replayed counter).
    #[error("ceremony verification failed: {0}")]
    Ceremony(#[from] WebauthnError),
}

/// Build the relying party for the daemon's documented application
/// identity, `https://<host-identity>:33443`. The port is fixed regardless
/// of the bind address.
pub fn build_webauthn(
    host_identity: &str,
    realm: Option<&str>,
) -> anyhow::Result<Webauthn> {
    let origin =
        Url::parse(&format!("https://{host_identity}:{SECOND_FACTOR_PORT}"))
            .context("Invalid relying party origin")?;
    WebauthnBuilder::new(host_identity, &origin)
        .context("Invalid relying party id")?
        .rp_name(realm.unwrap_or(host_identity))
        .build()
        .context("Could not build the relying party")
}

/// Per-user second-factor profile.
///
/// Only the stable user handle and the registered credentials are
/// persisted. Each credential carries its own signature counter, advanced
/// on every successful authentication and used to reject replays.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_handle: Uuid,
    pub credentials: Vec<Passkey>,
    /// Outstanding registration challenge; in-memory only.
    #[serde(skip)]
    pub pending_registration: Option<PasskeyRegistration>,
    /// Outstanding authentication challenge; in-memory only.
    #[serde(skip)]
    pub pending_authentication: Option<PasskeyAuthentication>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self {
            user_handle: Uuid::new_v4(),
            credentials: Vec::new(),
            pending_registration: None,
            pending_authentication: None,
        }
    }
}

/// Enrollment step 1: mint a fresh challenge, park the ceremony state in
/// the profile, and return the serialized request bundle. The ids of
/// already-registered credentials ride along so the authenticator refuses
/// duplicate enrollment.
pub fn begin_registration(
    webauthn: &Webauthn,
    username: &str,
    profile: &mut UserProfile,
) -> Result<CreationChallengeResponse, SecondFactorError> {
    let registered_keys = (!profile.credentials.is_empty()).then(|| {
        profile
            .credentials
            .iter()
            .map(|credential| credential.cred_id().clone())
            .collect()
    });

    let (challenge, state) = webauthn.start_passkey_registration(
        profile.user_handle,
        username,
        username,
        registered_keys,
    )?;
    profile.pending_registration = Some(state);
    Ok(challenge)
}

/// Enrollment step 2: verify the response against the parked challenge and
/// append the new credential. Attestation is deliberately not required;
/// enrollment is gated by primary authentication alone.
pub fn finish_registration(
    webauthn: &Webauthn,
    profile: &mut UserProfile,
    response: &RegisterPublicKeyCredential,
) -> Result<(), SecondFactorError> {
    let state = profile
        .pending_registration
        .take()
        .ok_or(SecondFactorError::NoPendingChallenge)?;
    let credential = webauthn.finish_passkey_registration(response, &state)?;
    profile.credentials.push(credential);
    Ok(())
}

/// Authentication step 1: mint a challenge over every registered
/// credential and park the ceremony state.
pub fn begin_authentication(
    webauthn: &Webauthn,
    profile: &mut UserProfile,
) -> Result<RequestChallengeResponse, SecondFactorError> {
    if profile.credentials.is_empty() {
        return Err(SecondFactorError::NoCredentials);
    }
    let (challenge, state) =
        webauthn.start_passkey_authentication(&profile.credentials)?;
    profile.pending_authentication = Some(state);
    Ok(challenge)
}

/// Authentication step 2: the credential the response verifies against
/// wins; its counter advances to the authenticator-reported value. A
/// counter at or below the stored value is a replay and fails verification.
pub fn finish_authentication(
    webauthn: &Webauthn,
    profile: &mut UserProfile,
    response: &PublicKeyCredential,
) -> Result<AuthenticationResult, SecondFactorError> {
    let state = profile
        .pending_authentication
        .take()
        .ok_or(SecondFactorError::NoPendingChallenge)?;
    let result = webauthn.finish_passkey_authentication(response, &state)?;

    for credential in profile.credentials.iter_mut() {
        if credential.update_credential(&result).is_some() {
            break;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_webauthn() -> Webauthn {
        build_webauthn("warden.test", Some("EXAMPLE.COM")).unwrap()
    }

    #[test]
    fn rp_origin_uses_the_fixed_port() {
        // The relying party builds even when the daemon binds elsewhere;
        // the identity is documented, not derived from the bind address.
        build_webauthn("warden.test", None).unwrap();
        assert!(build_webauthn("", None).is_err());
    }

    #[test]
    fn begin_registration_parks_the_challenge() {
        let webauthn = test_webauthn();
        let mut profile = UserProfile::new();

        let challenge =
            begin_registration(&webauthn, "alice", &mut profile).unwrap();
        assert!(profile.pending_registration.is_some());

        // The serialized bundle carries a non-trivial challenge.
        let json = serde_json::to_value(&challenge).unwrap();
        let challenge_b64 = json["publicKey"]["challenge"]
            .as_str()
            .expect("challenge field");
        assert!(challenge_b64.len() >= 16);

        // A re-request overwrites the previous pending state.
        begin_registration(&webauthn, "alice", &mut profile).unwrap();
        assert!(profile.pending_registration.is_some());
    }

    #[test]
    fn begin_authentication_requires_a_credential() {
        let webauthn = test_webauthn();
        let mut profile = UserProfile::new();
        let err =
            begin_authentication(&webauthn, &mut profile).unwrap_err();
        assert!(matches!(err, SecondFactorError::NoCredentials));
    }

    #[test]
    fn pending_state_is_not_persisted() {
        let webauthn = test_webauthn();
        let mut profile = UserProfile::new();
        begin_registration(&webauthn, "alice", &mut profile).unwrap();

        let blob = serde_json::to_string(&profile).unwrap();
        assert!(!blob.contains("pending"));

        let restored: UserProfile = serde_json::from_str(&blob).unwrap();
        assert_eq!(restored.user_handle, profile.user_handle);
        assert!(restored.pending_registration.is_none());
        assert!(restored.pending_authentication.is_none());
    }

    #[test]
    fn profile_round_trips_through_the_blob_format() {
        let profile = UserProfile::new();
        let blob = serde_json::to_vec(&profile).unwrap();
        let restored: UserProfile = serde_json::from_slice(&blob).unwrap();
        assert_eq!(restored.user_handle, profile.user_handle);
        assert_eq!(restored.credentials.len(), profile.credentials.len());
    }
}
