//! Daemon configuration: schema, YAML loading, host identity resolution.
//!
//! The configuration is loaded once at startup and is immutable afterwards;
//! it may be freely shared across tasks.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration document.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub base: BaseConfig,
    #[serde(default)]
    pub ldap: LdapConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BaseConfig {
    /// `host:port` the TLS listener binds to. An empty host binds all
    /// interfaces, e.g. `:33443`.
    pub http_address: String,
    pub tls_cert_filename: PathBuf,
    pub tls_key_filename: PathBuf,
    /// Either a clear PEM RSA private key, or an armored PGP blob for
    /// sealed-at-boot mode.
    pub ssh_ca_filename: PathBuf,
    /// Local password file with bcrypt-only rows.
    #[serde(default)]
    pub htpasswd_filename: Option<PathBuf>,
    /// PEM CA bundle trusted to sign administrative client certificates.
    #[serde(default)]
    pub client_ca_filename: Option<PathBuf>,
    /// Defaults to the resolved hostname.
    #[serde(default)]
    pub host_identity: Option<String>,
    #[serde(default)]
    pub kerberos_realm: Option<String>,
    pub data_directory: PathBuf,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LdapConfig {
    /// Format string with a single `%s` slot which produces a bind DN from a
    /// username, e.g. `uid=%s,ou=people,dc=example,dc=com`.
    #[serde(default)]
    pub bind_pattern: String,
    /// Comma-separated `ldaps://` URLs, tried in order.
    #[serde(default)]
    pub ldap_target_urls: String,
}

impl AppConfig {
    /// Load and validate the YAML configuration document at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!("Could not read config file: {}", path.display())
        })?;
        let config = Self::from_yaml(&contents).with_context(|| {
            format!("Malformed config file: {}", path.display())
        })?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_yaml::from_str(contents).context("Invalid YAML")?;
        // Fail fast on an unusable bind address rather than at bind time.
        config.bind_addr()?;
        Ok(config)
    }

    /// The socket address the TLS listener binds to.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let address = &self.base.http_address;
        // `:port` means all interfaces.
        let normalized = if address.starts_with(':') {
            format!("0.0.0.0{address}")
        } else {
            address.clone()
        };
        normalized
            .parse()
            .with_context(|| format!("Invalid http_address: {address}"))
    }

    /// The configured host identity, or the resolved local hostname.
    pub fn host_identity(&self) -> anyhow::Result<String> {
        if let Some(identity) = &self.base.host_identity {
            return Ok(identity.clone());
        }
        let name = hostname::get().context("Could not resolve hostname")?;
        name.into_string()
            .map_err(|_| anyhow::anyhow!("Hostname is not valid UTF-8"))
    }

    /// The configured directory URLs, split and trimmed, in order.
    pub fn ldap_urls(&self) -> Vec<String> {
        self.ldap
            .ldap_target_urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(String::from)
            .collect()
    }

    /// Path of the persisted profile blob.
    pub fn profile_path(&self) -> PathBuf {
        self.base
            .data_directory
            .join(crate::constants::USER_PROFILE_FILENAME)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FULL_CONFIG: &str = r#"
base:
  http_address: "0.0.0.0:33443"
  tls_cert_filename: /etc/keywarden/server.pem
  tls_key_filename: /etc/keywarden/server.key
  ssh_ca_filename: /etc/keywarden/ca.key
  htpasswd_filename: /etc/keywarden/htpasswd
  client_ca_filename: /etc/keywarden/admin-ca.pem
  host_identity: warden.example.com
  kerberos_realm: EXAMPLE.COM
  data_directory: /var/lib/keywarden
ldap:
  bind_pattern: "uid=%s,ou=people,dc=example,dc=com"
  ldap_target_urls: "ldaps://ldap1.example.com, ldaps://ldap2.example.com:1636"
"#;

    const MINIMAL_CONFIG: &str = r#"
base:
  http_address: ":8443"
  tls_cert_filename: server.pem
  tls_key_filename: server.key
  ssh_ca_filename: ca.key
  data_directory: data
"#;

    #[test]
    fn parse_full_config() {
        let config = AppConfig::from_yaml(FULL_CONFIG).unwrap();
        assert_eq!(config.base.host_identity.as_deref(), Some("warden.example.com"));
        assert_eq!(config.base.kerberos_realm.as_deref(), Some("EXAMPLE.COM"));
        assert_eq!(
            config.ldap_urls(),
            vec![
                "ldaps://ldap1.example.com".to_owned(),
                "ldaps://ldap2.example.com:1636".to_owned(),
            ],
        );
        assert_eq!(
            config.profile_path(),
            PathBuf::from("/var/lib/keywarden/userProfiles.gob"),
        );
        assert_eq!(config.bind_addr().unwrap().port(), 33443);
    }

    #[test]
    fn parse_minimal_config() {
        let config = AppConfig::from_yaml(MINIMAL_CONFIG).unwrap();
        assert!(config.base.htpasswd_filename.is_none());
        assert!(config.base.client_ca_filename.is_none());
        assert!(config.ldap_urls().is_empty());
        // `:8443` binds all interfaces.
        let addr = config.bind_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 8443);
    }

    #[test]
    fn reject_garbage_address() {
        let bad = MINIMAL_CONFIG.replace(":8443", "not-an-address");
        assert!(AppConfig::from_yaml(&bad).is_err());
    }

    #[test]
    fn host_identity_falls_back_to_hostname() {
        let config = AppConfig::from_yaml(MINIMAL_CONFIG).unwrap();
        let identity = config.host_identity().unwrap();
        assert!(!identity.is_empty());
    }
}
