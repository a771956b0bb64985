//! Error types for the agent-syscfg core library.
//!
//! Each subsystem has its own error type derived with `thiserror`.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading the JSON configuration file.
///
/// A missing file is not an error; see [`crate::config::SyscfgConfig::load`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("reading configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has values of the wrong shape.
    #[error("parsing configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// File errors
// ---------------------------------------------------------------------------

/// Errors from idempotent file writes and removals.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("opening {path} for reading: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("creating directory for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deleting {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// External command errors
// ---------------------------------------------------------------------------

/// Errors from invoking external tools (`systemctl`, `apt`, ...).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary was not found on `$PATH`.
    #[error("executing '{command}': binary not found")]
    BinaryNotFound { command: String },

    /// The command ran and exited unsuccessfully. `output` is the combined
    /// stdout and stderr.
    #[error("executing '{command}' failed (exit {exit_code}): {output}")]
    Failed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// Spawning or waiting on the process failed.
    #[error("executing '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Logging (journald) errors
// ---------------------------------------------------------------------------

/// Errors from enforcing journald size limits.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// `systemctl is-enabled systemd-journald` failed.
    #[error("agent-syscfg can only adjust logging settings for systems using systemd with journald enabled: {0}")]
    JournaldUnavailable(#[source] CommandError),

    /// One of the size limits does not match `^[0-9]+[KMGTPE]$`.
    #[error("logfile size limits must be specified in bytes, with one optional suffix character [KMGTPE] (got system_max_use={system_max_use:?}, runtime_max_use={runtime_max_use:?})")]
    InvalidSizeLimit {
        system_max_use: String,
        runtime_max_use: String,
    },

    #[error(transparent)]
    File(#[from] FileError),

    /// Restarting journald after a change failed.
    #[error("restarting journald: {0}")]
    Restart(#[source] CommandError),
}

// ---------------------------------------------------------------------------
// Upgrade policy errors
// ---------------------------------------------------------------------------

/// Errors from enforcing the unattended-upgrades policy.
#[derive(Debug, Error)]
pub enum UpgradesError {
    /// `/etc/os-release` could not be read.
    #[error("reading {path}: {source}")]
    OsRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `upgrades.type` is not one of the values we understand.
    #[error("unknown upgrades type '{value}', expected one of \"disable\", \"security\", \"all\"")]
    UnknownPolicy { value: String },

    #[error("cannot enable automatic upgrades for unknown distro, only support for Debian bullseye and bookworm is available")]
    UnsupportedDistro,

    /// Installing the `unattended-upgrades` package failed.
    #[error("installing unattended-upgrades: {0}")]
    Install(#[source] CommandError),

    /// Reading the configured apt sources failed.
    #[error("listing apt release origins: {0}")]
    Origins(#[source] CommandError),

    #[error("enabling apt-daily-upgrade.timer: {0}")]
    EnableTimer(#[source] CommandError),

    /// The process was asked to shut down during a long-running step.
    #[error("cancelled during {step}")]
    Cancelled { step: &'static str },

    #[error(transparent)]
    File(#[from] FileError),
}
