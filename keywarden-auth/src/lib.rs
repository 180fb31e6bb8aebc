//! Authentication for the keywarden daemon.
//!
//! Two layers: the primary factor (username/password against directory
//! and/or local password file backends) and the second factor (hardware
//! authenticators bound to per-user profiles via challenge/response
//! ceremonies).

pub mod htpasswd;
pub mod ldap;
pub mod primary;
pub mod second_factor;

pub use primary::PrimaryAuthenticator;
pub use second_factor::UserProfile;
