//! Shared plumbing for the keywarden daemon: configuration, constants,
//! shutdown signalling, and small filesystem helpers.

pub mod config;
pub mod constants;
pub mod fs;
pub mod shutdown;
