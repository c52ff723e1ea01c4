//! # hasp-core
//!
//! The engine behind the hasp lock daemon. Provides DLM-style lock
//! scheduling over named resources, sequence pools with transactional
//! rollback, idle-resource reaping, and UDP autodiscovery, plus the
//! client session handle that speaks the daemon's wire protocol.

pub mod compat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod proto;
pub mod reaper;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod compat_test;
#[cfg(test)]
mod registry_test;
#[cfg(test)]
mod session_test;
