//! keywardend: a short-lived credential issuance daemon.
//!
//! An authenticated user obtains a freshly minted SSH user certificate
//! and/or an X.509 client certificate, each signed by a locally held CA key
//! and bound to the requester's identity, with validity measured in hours.

pub mod error;
pub mod handlers;
pub mod keylookup;
pub mod pages;
pub mod server;
pub mod state;
