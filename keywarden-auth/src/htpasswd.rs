//! Local password file verification. Rows are `name:hash` with bcrypt
//! hashes only; any other hash scheme is skipped.

use anyhow::Context;
use tracing::warn;

/// Verify `password` for `username` against htpasswd file contents.
/// Unknown users verify as false.
pub fn verify(
    contents: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<bool> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, hash)) = line.split_once(':') else {
            continue;
        };
        if name != username {
            continue;
        }
        if !hash.starts_with("$2") {
            warn!("htpasswd row for {username} is not bcrypt, skipping");
            continue;
        }
        return bcrypt::verify(password, hash)
            .context("bcrypt verification failed");
    }
    Ok(false)
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_file() -> String {
        let hash = bcrypt::hash("hunter2", bcrypt::DEFAULT_COST.min(6))
            .expect("bcrypt hash");
        format!(
            "# comment\n\
             alice:{hash}\n\
             crufty:{{SHA}}notsupported\n\
             malformed-row\n"
        )
    }

    #[test]
    fn accepts_the_right_password() {
        let contents = test_file();
        assert!(verify(&contents, "alice", "hunter2").unwrap());
    }

    #[test]
    fn rejects_a_wrong_password() {
        let contents = test_file();
        assert!(!verify(&contents, "alice", "wrong").unwrap());
    }

    #[test]
    fn unknown_user_is_not_valid() {
        let contents = test_file();
        assert!(!verify(&contents, "bob", "hunter2").unwrap());
    }

    #[test]
    fn non_bcrypt_rows_are_skipped() {
        let contents = test_file();
        assert!(!verify(&contents, "crufty", "anything").unwrap());
    }
}
