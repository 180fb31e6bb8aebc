//! Process-wide constants.

use std::time::Duration;

/// Name of the session cookie set by the login endpoint.
pub const AUTH_COOKIE_NAME: &str = "auth_cookie";

/// Lifetime of a session cookie from the moment of issuance.
pub const COOKIE_LIFETIME: Duration = Duration::from_secs(300);

/// Cadence of the background session expirer.
pub const COOKIE_EXPIRATION_INTERVAL: Duration = Duration::from_secs(30);

/// Realm advertised in `WWW-Authenticate` challenges.
pub const BASIC_AUTH_REALM: &str = "User Credentials";

/// Fixed port embedded in the second-factor application identity,
/// independent of the address the daemon actually binds.
pub const SECOND_FACTOR_PORT: u16 = 33443;

/// Validity window of issued SSH and X.509 user certificates.
pub const USER_CERT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Filename of the persisted profile blob within the data directory.
pub const USER_PROFILE_FILENAME: &str = "userProfiles.gob";

/// Unix mode of the persisted profile blob.
pub const USER_PROFILE_MODE: u32 = 0o640;

/// Per-URL connect timeout for directory binds.
pub const LDAP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default command used to look up a user's published SSH public key.
/// Invoked with the username as its only argument.
pub const DEFAULT_KEY_LOOKUP_CMD: &str = "sss_ssh_authorizedkeys";
