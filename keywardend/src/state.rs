//! Process-wide runtime state.
//!
//! One value, constructed at startup and handed to every handler. The CA
//! state, the cookie-to-identity map, and the username-to-profile map all
//! live behind a single mutex. Critical sections stay narrow: handlers copy
//! the signer `Arc` out under lock and sign outside it. The one exception
//! is the profile write path, which holds the lock across the full
//! read-modify-write and the blob write so the on-disk state is never torn.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use anyhow::Context;
use base64::Engine;
use keywarden_auth::{
    second_factor::{self, SecondFactorError},
    PrimaryAuthenticator, UserProfile,
};
use keywarden_common::{
    config::AppConfig,
    constants::{
        COOKIE_EXPIRATION_INTERVAL, COOKIE_LIFETIME, USER_PROFILE_MODE,
    },
    fs::write_file_atomic,
    shutdown::ShutdownChannel,
};
use keywarden_signer::{CaSigner, CaState};
use rand::RngCore;
use tracing::{debug, info, warn};
use webauthn_rs::prelude::{
    CreationChallengeResponse, PublicKeyCredential,
    RegisterPublicKeyCredential, RequestChallengeResponse, Webauthn,
};

use crate::{error::ApiError, keylookup::KeyLookup};

/// An authenticated identity bound to a cookie value. An entry whose
/// `expires_at` has passed is treated as absent.
#[derive(Clone, Debug)]
pub struct AuthInfo {
    pub username: String,
    pub expires_at: SystemTime,
}

pub struct RuntimeState {
    pub config: AppConfig,
    pub host_identity: String,
    pub authenticator: PrimaryAuthenticator,
    pub webauthn: Webauthn,
    pub key_lookup: KeyLookup,
    profile_path: PathBuf,
    inner: Mutex<StateInner>,
}

struct StateInner {
    ca: CaState,
    sessions: HashMap<String, AuthInfo>,
    profiles: HashMap<String, UserProfile>,
}

impl RuntimeState {
    pub fn new(
        config: AppConfig,
        host_identity: String,
        authenticator: PrimaryAuthenticator,
        webauthn: Webauthn,
        key_lookup: KeyLookup,
        ca: CaState,
    ) -> Self {
        let profile_path = config.profile_path();
        let profiles = load_profiles(&profile_path);
        Self {
            config,
            host_identity,
            authenticator,
            webauthn,
            key_lookup,
            profile_path,
            inner: Mutex::new(StateInner {
                ca,
                sessions: HashMap::new(),
                profiles,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().expect("state mutex poisoned")
    }

    // --- CA lifecycle --- //

    /// Copy the signer out from under the lock, if unsealed.
    pub fn signer(&self) -> Option<Arc<CaSigner>> {
        self.lock().ca.signer()
    }

    /// The signer, or the error every sealed-gated path maps to.
    pub fn signer_or_sealed(&self) -> Result<Arc<CaSigner>, ApiError> {
        self.signer().ok_or(ApiError::Sealed)
    }

    /// One-shot unseal. The armored payload is copied out under the lock
    /// and decrypted outside it; installation re-checks that no concurrent
    /// unseal won the race. The transition is one-way: a second successful
    /// attempt conflicts.
    pub fn unseal(&self, passphrase: &str) -> Result<(), ApiError> {
        let armored = match &self.lock().ca {
            CaState::Unsealed(_) =>
                return Err(ApiError::Conflict("signer is already unsealed")),
            CaState::Sealed { armored } => armored.clone(),
        };

        let plaintext =
            keywarden_signer::unseal::decrypt_armored(&armored, passphrase)
                .map_err(|err| {
                    ApiError::BadRequest(format!(
                        "could not decrypt CA key: {err:#}"
                    ))
                })?;

        let pem = std::str::from_utf8(&plaintext)
            .context("Decrypted CA key is not UTF-8")?;
        if !pem.trim_start().starts_with(keywarden_signer::RSA_PEM_MARKER) {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "decrypted payload is not an RSA private key PEM"
            )));
        }
        let realm = self.config.base.kerberos_realm.as_deref();
        let signer =
            CaSigner::from_rsa_pem(pem, &self.host_identity, realm)
                .context("Could not build a signer from the unsealed key")?;

        let mut inner = self.lock();
        match inner.ca {
            CaState::Sealed { .. } => {
                inner.ca = CaState::Unsealed(Arc::new(signer));
                info!("CA unsealed; certificate issuance is now available");
                Ok(())
            }
            CaState::Unsealed(_) =>
                Err(ApiError::Conflict("signer is already unsealed")),
        }
    }

    // --- Sessions --- //

    /// Record a fresh session for `username` and return the cookie value:
    /// 32 bytes of OS randomness, base64-url encoded.
    pub fn new_session(&self, username: &str) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let cookie =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        let info = AuthInfo {
            username: username.to_owned(),
            expires_at: SystemTime::now() + COOKIE_LIFETIME,
        };
        self.lock().sessions.insert(cookie.clone(), info);
        cookie
    }

    /// The identity bound to `cookie`, unless missing or expired.
    pub fn session_user(&self, cookie: &str) -> Option<String> {
        let inner = self.lock();
        let info = inner.sessions.get(cookie)?;
        if info.expires_at <= SystemTime::now() {
            return None;
        }
        Some(info.username.clone())
    }

    /// Delete expired sessions. Called by the background expirer.
    pub fn expire_sessions(&self) {
        let now = SystemTime::now();
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, info| info.expires_at > now);
        let after = inner.sessions.len();
        debug!("Session expirer: {before} -> {after} entries");
    }

    #[cfg(test)]
    pub fn insert_session(
        &self,
        cookie: &str,
        username: &str,
        expires_at: SystemTime,
    ) {
        self.lock().sessions.insert(
            cookie.to_owned(),
            AuthInfo {
                username: username.to_owned(),
                expires_at,
            },
        );
    }

    // --- Second-factor profiles --- //

    /// Number of second factors registered for `username`.
    pub fn credential_count(&self, username: &str) -> usize {
        self.lock()
            .profiles
            .get(username)
            .map(|profile| profile.credentials.len())
            .unwrap_or(0)
    }

    /// Enrollment step 1. Creates the profile lazily; nothing persisted
    /// changes, so the blob is not rewritten.
    pub fn register_begin(
        &self,
        username: &str,
    ) -> Result<CreationChallengeResponse, ApiError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .entry(username.to_owned())
            .or_insert_with(UserProfile::new);
        second_factor::begin_registration(&self.webauthn, username, profile)
            .map_err(into_api_error)
    }

    /// Enrollment step 2. Persists the profile map before returning.
    pub fn register_finish(
        &self,
        username: &str,
        response: &RegisterPublicKeyCredential,
    ) -> Result<(), ApiError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(username)
            .ok_or(ApiError::BadRequest("no pending challenge".to_owned()))?;
        second_factor::finish_registration(&self.webauthn, profile, response)
            .map_err(into_api_error)?;
        info!("Registered a new second factor for {username}");
        self.persist_profiles(&inner.profiles)?;
        Ok(())
    }

    /// Authentication step 1.
    pub fn sign_begin(
        &self,
        username: &str,
    ) -> Result<RequestChallengeResponse, ApiError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(username)
            .ok_or(ApiError::BadRequest(
                "no second factors registered".to_owned(),
            ))?;
        second_factor::begin_authentication(&self.webauthn, profile)
            .map_err(into_api_error)
    }

    /// Authentication step 2. The advanced counter is persisted before the
    /// response returns, so it is visible to any subsequent attempt.
    pub fn sign_finish(
        &self,
        username: &str,
        response: &PublicKeyCredential,
    ) -> Result<(), ApiError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(username)
            .ok_or(ApiError::BadRequest("no pending challenge".to_owned()))?;
        second_factor::finish_authentication(&self.webauthn, profile, response)
            .map_err(into_api_error)?;
        self.persist_profiles(&inner.profiles)?;
        Ok(())
    }

    /// Serialize and atomically write the whole profile map. Callers hold
    /// the state lock, accepting the latency so the blob on disk always
    /// reflects a consistent map.
    fn persist_profiles(
        &self,
        profiles: &HashMap<String, UserProfile>,
    ) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec(profiles)
            .context("Could not serialize user profiles")?;
        write_file_atomic(&self.profile_path, &bytes, USER_PROFILE_MODE)
            .context("Could not write the profile blob")?;
        Ok(())
    }
}

fn into_api_error(err: SecondFactorError) -> ApiError {
    match err {
        SecondFactorError::NoCredentials =>
            ApiError::BadRequest("no second factors registered".to_owned()),
        SecondFactorError::NoPendingChallenge =>
            ApiError::BadRequest("no pending challenge".to_owned()),
        SecondFactorError::Ceremony(err) =>
            ApiError::Internal(anyhow::Error::new(err).context(
                "second factor verification failed",
            )),
    }
}

/// Read the profile blob. Missing or unreadable blobs are logged, not
/// fatal; the daemon starts with an empty map.
fn load_profiles(path: &Path) -> HashMap<String, UserProfile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("No profile blob at {}; starting empty", path.display());
            return HashMap::new();
        }
        Err(err) => {
            warn!("Could not read profile blob {}: {err}", path.display());
            return HashMap::new();
        }
    };
    match serde_json::from_slice::<HashMap<String, UserProfile>>(&bytes) {
        Ok(profiles) => {
            info!("Loaded {} user profiles", profiles.len());
            profiles
        }
        Err(err) => {
            warn!("Could not parse profile blob {}: {err}", path.display());
            HashMap::new()
        }
    }
}

/// Spawn the background session expirer; runs until shutdown.
pub fn spawn_session_expirer(
    state: Arc<RuntimeState>,
    mut shutdown: ShutdownChannel,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(COOKIE_EXPIRATION_INTERVAL);
        ticker.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.recv() => break,
                _ = ticker.tick() => state.expire_sessions(),
            }
        }
        debug!("Session expirer finished");
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::unsealed_harness;

    #[tokio::test]
    async fn cookies_are_long_and_unique() {
        let harness = unsealed_harness();
        let state = &harness.state;
        let cookie1 = state.new_session("alice");
        let cookie2 = state.new_session("alice");
        // 32 bytes of randomness base64url-encodes to 43 chars.
        assert_eq!(cookie1.len(), 43);
        assert_ne!(cookie1, cookie2);
        assert_eq!(state.session_user(&cookie1).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unknown_cookies_are_unauthenticated() {
        let harness = unsealed_harness();
        let state = &harness.state;
        assert_eq!(state.session_user("no-such-cookie"), None);
    }

    #[tokio::test]
    async fn expired_sessions_are_absent() {
        let harness = unsealed_harness();
        let state = &harness.state;
        let past = SystemTime::now() - Duration::from_secs(1);
        state.insert_session("stale", "alice", past);
        assert_eq!(state.session_user("stale"), None);

        // The expirer also deletes the entry outright.
        state.expire_sessions();
        assert_eq!(state.session_user("stale"), None);
    }

    #[tokio::test]
    async fn register_begin_creates_a_profile_lazily() {
        let harness = unsealed_harness();
        let state = &harness.state;
        assert_eq!(state.credential_count("alice"), 0);
        state.register_begin("alice").unwrap();
        // A profile now exists, with a pending challenge but no credential.
        assert_eq!(state.credential_count("alice"), 0);
    }

    #[tokio::test]
    async fn sign_begin_requires_credentials() {
        let harness = unsealed_harness();
        let state = &harness.state;
        let err = state.sign_begin("alice").unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unseal_conflicts_when_already_unsealed() {
        let harness = unsealed_harness();
        let state = &harness.state;
        let err = state.unseal("hunter2").unwrap_err();
        assert_eq!(err.status(), http::StatusCode::CONFLICT);
    }
}
