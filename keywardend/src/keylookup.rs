//! External user-key lookup.
//!
//! The published SSH public key of a user is fetched by a local subprocess
//! taking the username as its only argument and printing the key on stdout.
//! A non-zero exit means "no key available"; failing to run the command at
//! all means the tooling is broken, which is a different failure.

use std::path::PathBuf;

use anyhow::Context;
use keywarden_common::constants::DEFAULT_KEY_LOOKUP_CMD;
use tracing::debug;

/// Distinguishes "user has no key" from broken tooling (the latter is the
/// `Err` arm of [`KeyLookup::fetch`]).
#[derive(Debug)]
pub enum KeyLookupOutcome {
    Found(String),
    NotFound,
}

pub struct KeyLookup {
    command: PathBuf,
}

impl KeyLookup {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn default_cmd() -> Self {
        Self::new(DEFAULT_KEY_LOOKUP_CMD)
    }

    /// Run `<command> <username>` and return the first non-empty stdout
    /// line as the user's public key.
    pub async fn fetch(
        &self,
        username: &str,
    ) -> anyhow::Result<KeyLookupOutcome> {
        let output = tokio::process::Command::new(&self.command)
            .arg(username)
            .output()
            .await
            .with_context(|| {
                format!(
                    "Could not run key lookup command: {}",
                    self.command.display()
                )
            })?;

        if !output.status.success() {
            debug!("Key lookup for {username} exited {}", output.status);
            return Ok(KeyLookupOutcome::NotFound);
        }

        let stdout = String::from_utf8(output.stdout)
            .context("Key lookup output is not UTF-8")?;
        match stdout.lines().find(|line| !line.trim().is_empty()) {
            Some(key) => Ok(KeyLookupOutcome::Found(key.to_owned())),
            None => Ok(KeyLookupOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn echo_command_finds_a_key() {
        let lookup = KeyLookup::new("/bin/echo");
        match lookup.fetch("ssh-ed25519 AAAA alice@host").await.unwrap() {
            KeyLookupOutcome::Found(key) =>
                assert!(key.starts_with("ssh-ed25519")),
            other => panic!("expected a key, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_means_no_key() {
        let lookup = KeyLookup::new("/bin/false");
        assert!(matches!(
            lookup.fetch("alice").await.unwrap(),
            KeyLookupOutcome::NotFound,
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_an_upstream_failure() {
        let lookup = KeyLookup::new("/nonexistent/key-lookup");
        assert!(lookup.fetch("alice").await.is_err());
    }

    #[tokio::test]
    async fn empty_output_means_no_key() {
        let lookup = KeyLookup::new("/bin/true");
        assert!(matches!(
            lookup.fetch("alice").await.unwrap(),
            KeyLookupOutcome::NotFound,
        ));
    }
}
