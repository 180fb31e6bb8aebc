//! Primary (username/password) verification across configured backends.

use std::path::PathBuf;

use keywarden_common::config::AppConfig;
use tracing::{info, warn};

use crate::{
    htpasswd,
    ldap::{self, BindOutcome},
};

/// Verifies a username/password pair against the configured directory URLs
/// (in order) and, failing all of those at the transport level, the local
/// password file.
pub struct PrimaryAuthenticator {
    bind_pattern: String,
    target_urls: Vec<String>,
    htpasswd_file: Option<PathBuf>,
}

impl PrimaryAuthenticator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            bind_pattern: config.ldap.bind_pattern.clone(),
            target_urls: config.ldap_urls(),
            htpasswd_file: config.base.htpasswd_filename.clone(),
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn htpasswd_only(htpasswd_file: PathBuf) -> Self {
        Self {
            bind_pattern: String::new(),
            target_urls: Vec::new(),
            htpasswd_file: Some(htpasswd_file),
        }
    }

    /// Whether the credentials are valid.
    ///
    /// A directory that completes the bind conversation is definitive,
    /// accept or reject. Transport-level failures are swallowed and the next
    /// backend is consulted; if no backend yields a definitive answer the
    /// credentials are not valid. Bounded by the per-URL connect timeout,
    /// so this never blocks longer than (#URLs x timeout) plus the password
    /// file read.
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }

        for url in &self.target_urls {
            let dn = ldap::bind_dn(&self.bind_pattern, username);
            match ldap::try_bind(url, &dn, password).await {
                Ok(BindOutcome::Accepted) => return true,
                Ok(BindOutcome::Rejected) => {
                    info!("Directory rejected credentials for {username}");
                    return false;
                }
                Err(err) => {
                    warn!("Directory backend unavailable: {err:#}");
                }
            }
        }

        if let Some(path) = &self.htpasswd_file {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) =>
                    match htpasswd::verify(&contents, username, password) {
                        Ok(valid) => return valid,
                        Err(err) => {
                            warn!("htpasswd verification errored: {err:#}")
                        }
                    },
                Err(err) => warn!(
                    "Could not read htpasswd file {}: {err}",
                    path.display()
                ),
            }
        }

        false
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    fn write_htpasswd(dir: &tempfile::TempDir) -> PathBuf {
        let hash = bcrypt::hash("hunter2", bcrypt::DEFAULT_COST.min(6))
            .expect("bcrypt hash");
        let path = dir.path().join("htpasswd");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "alice:{hash}").unwrap();
        path
    }

    #[tokio::test]
    async fn empty_credentials_are_never_valid() {
        let dir = tempfile::tempdir().unwrap();
        let auth = PrimaryAuthenticator::htpasswd_only(write_htpasswd(&dir));
        assert!(!auth.verify("", "hunter2").await);
        assert!(!auth.verify("alice", "").await);
    }

    #[tokio::test]
    async fn falls_back_to_htpasswd_when_no_directory_configured() {
        let dir = tempfile::tempdir().unwrap();
        let auth = PrimaryAuthenticator::htpasswd_only(write_htpasswd(&dir));
        assert!(auth.verify("alice", "hunter2").await);
        assert!(!auth.verify("alice", "wrong").await);
        assert!(!auth.verify("bob", "hunter2").await);
    }

    #[tokio::test]
    async fn no_backends_means_not_valid() {
        let auth = PrimaryAuthenticator {
            bind_pattern: String::new(),
            target_urls: Vec::new(),
            htpasswd_file: None,
        };
        assert!(!auth.verify("alice", "hunter2").await);
    }

    #[tokio::test]
    async fn missing_htpasswd_file_is_swallowed() {
        let auth = PrimaryAuthenticator::htpasswd_only(PathBuf::from(
            "/nonexistent/htpasswd",
        ));
        assert!(!auth.verify("alice", "hunter2").await);
    }
}
