//! Directory-bind verification over LDAPS.

use anyhow::{ensure, Context};
use keywarden_common::constants::LDAP_CONNECT_TIMEOUT;
use ldap3::{LdapConnAsync, LdapConnSettings};
use tracing::debug;
use url::Url;

/// Outcome of a single directory bind conversation.
#[derive(Debug)]
pub enum BindOutcome {
    /// The directory accepted the credentials.
    Accepted,
    /// The directory rejected the credentials.
    Rejected,
}

/// Substitute `username` into the single `%s` slot of the bind pattern.
pub fn bind_dn(pattern: &str, username: &str) -> String {
    pattern.replacen("%s", username, 1)
}

/// Attempt one secure-directory bind. Transport-level failures are `Err` so
/// the caller can fall through to the next URL; a completed conversation is
/// always `Ok` with the directory's verdict.
pub async fn try_bind(
    raw_url: &str,
    bind_dn: &str,
    password: &str,
) -> anyhow::Result<BindOutcome> {
    let url = Url::parse(raw_url).context("Invalid directory URL")?;
    ensure!(
        url.scheme() == "ldaps",
        "Directory URL must use the ldaps scheme: {raw_url}"
    );
    let host = url.host_str().context("Directory URL has no host")?;
    let port = url.port().unwrap_or(636);
    let target = format!("ldaps://{host}:{port}");

    let settings =
        LdapConnSettings::new().set_conn_timeout(LDAP_CONNECT_TIMEOUT);
    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &target)
        .await
        .with_context(|| format!("Could not connect to {target}"))?;
    ldap3::drive!(conn);

    let result = ldap
        .simple_bind(bind_dn, password)
        .await
        .context("Bind conversation failed")?;
    let _ = ldap.unbind().await;

    if result.rc == 0 {
        Ok(BindOutcome::Accepted)
    } else {
        debug!("Directory rejected bind for {bind_dn}: rc={}", result.rc);
        Ok(BindOutcome::Rejected)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bind_dn_substitutes_once() {
        assert_eq!(
            bind_dn("uid=%s,ou=people,dc=example,dc=com", "alice"),
            "uid=alice,ou=people,dc=example,dc=com",
        );
        // Only the first slot is substituted.
        assert_eq!(bind_dn("%s-%s", "a"), "a-%s");
        // A pattern without a slot passes through.
        assert_eq!(bind_dn("cn=admin", "alice"), "cn=admin");
    }

    #[tokio::test]
    async fn rejects_non_ldaps_schemes() {
        let err = try_bind("ldap://ldap.example.com", "cn=x", "pw")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ldaps"));

        assert!(try_bind("not a url", "cn=x", "pw").await.is_err());
    }
}
