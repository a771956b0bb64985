//! Configuration for agent-syscfg.
//!
//! The config file is a JSON object with two optional sections, `logging`
//! and `upgrades`. Unknown keys are ignored and a missing file yields the
//! default config.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Default location of the config file written by the parent agent.
pub const DEFAULT_CONFIG_PATH: &str = "/opt/viam/etc/agent-syscfg.json";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level agent-syscfg configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscfgConfig {
    /// journald size limits.
    #[serde(default)]
    pub logging: LogConfig,

    /// Unattended OS upgrade policy.
    #[serde(default)]
    pub upgrades: UpgradesConfig,
}

// ---------------------------------------------------------------------------
// Logging section
// ---------------------------------------------------------------------------

/// journald retention limits.
///
/// Empty size strings fall back to the enforcer's default limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Remove our journald override and fall back to system defaults.
    #[serde(default)]
    pub disable: bool,

    /// `SystemMaxUse=` for persistent storage, e.g. `512M`.
    #[serde(default)]
    pub system_max_use: String,

    /// `RuntimeMaxUse=` for volatile storage, e.g. `128M`.
    #[serde(default)]
    pub runtime_max_use: String,
}

// ---------------------------------------------------------------------------
// Upgrades section
// ---------------------------------------------------------------------------

/// Unattended-upgrades settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradesConfig {
    #[serde(rename = "type", default)]
    pub policy: UpgradePolicy,
}

/// Which automatic OS upgrades should be enabled.
///
/// Unrecognized values parse as [`UpgradePolicy::Unknown`] rather than
/// failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpgradePolicy {
    /// Make no changes to the host.
    #[default]
    Unset,
    /// Turn automatic upgrades off.
    Disable,
    /// Only install upgrades from security origins.
    Security,
    /// Install upgrades from every configured origin.
    All,
    /// A value we don't recognize. The upgrades enforcer refuses it.
    Unknown(String),
}

impl From<String> for UpgradePolicy {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Unset,
            "disable" | "disabled" => Self::Disable,
            "security" => Self::Security,
            "all" => Self::All,
            _ => Self::Unknown(value),
        }
    }
}

impl From<UpgradePolicy> for String {
    fn from(policy: UpgradePolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for UpgradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unset => "",
            Self::Disable => "disable",
            Self::Security => "security",
            Self::All => "all",
            Self::Unknown(value) => value.as_str(),
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl SyscfgConfig {
    /// Load a [`SyscfgConfig`] from a JSON file at the given path.
    ///
    /// A missing file is not an error and yields [`SyscfgConfig::default`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: SyscfgConfig =
            serde_json::from_slice(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("configuration parsed successfully");
        Ok(config)
    }
}
