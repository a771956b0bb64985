//! agent-syscfg core library.
//!
//! This crate provides the pieces of the agent-syscfg plugin: the shared
//! process lifecycle (cancellation and healthcheck state), the healthcheck
//! sleep, signal classification, configuration loading, and the enforcers
//! that reconcile journald limits and the unattended-upgrades policy with
//! the host.

pub mod command;
pub mod config;
pub mod errors;
pub mod files;
pub mod health;
pub mod lifecycle;
pub mod logging;
#[cfg(unix)]
pub mod signals;
pub mod upgrades;
pub mod version;

// Re-exports for convenience.
pub use config::SyscfgConfig;
pub use lifecycle::Lifecycle;
pub use logging::JournaldEnforcer;
pub use upgrades::UpgradesEnforcer;
