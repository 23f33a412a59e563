//! nova-servertester library
//!
//! Acceptance test for cloud server provisioning: boot a batch of servers
//! whose user data carries a small "call home" shim, wait for them to become
//! ACTIVE and then for each guest to report the outcome of its test script
//! through server metadata. Everything created is cleaned up on failure or
//! interrupt.
//!
//! # Layout
//!
//! - [`workflow`]: generic step engine with an append-only rollback log
//! - [`provisioning`]: the provisioning test built on the engine
//! - [`shim`] and [`userdata`]: the boot payload injected into the guests
//! - [`compute`]: the cloud API collaborator (REST client and mock)

pub mod compute;
pub mod config;
pub mod provisioning;
pub mod shim;
pub mod template;
pub mod userdata;
pub mod workflow;

mod error;

pub use error::TesterError;
