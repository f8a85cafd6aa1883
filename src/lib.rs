//! spt-entrypoint - container entrypoint for SPT dedicated servers
//!
//! Builds or reuses the server, installs mods, runs a first launch to
//! generate default configuration, patches it, links persistent data, and
//! runs the server in the foreground as an unprivileged account.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod mods;
pub mod orchestrator;
pub mod patch;
pub mod persist;
pub mod privilege;
pub mod probe;
pub mod process;

pub use error::{EntrypointError, EntrypointResult};
