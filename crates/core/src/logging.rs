//! journald size limits.
//!
//! Writes a drop-in fragment under `journald.conf.d` with `SystemMaxUse=`
//! and `RuntimeMaxUse=`, restarting journald only when the fragment
//! actually changed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::{error, info};

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::LogConfig;
use crate::errors::{FileError, LoggingError};
use crate::files::{remove_file_if_exists, write_file_if_new};

/// Location of our journald drop-in, relative to the host root.
pub const JOURNALD_CONF_PATH: &str = "etc/systemd/journald.conf.d/90-viam.conf";

/// Limit applied when the config leaves a size empty.
pub const DEFAULT_LOG_LIMIT: &str = "512M";

static SIZE_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[KMGTPE]$").expect("size limit pattern is valid"));

/// What [`JournaldEnforcer::apply`] did to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingOutcome {
    /// The fragment already had the requested limits.
    Unchanged {
        system_max_use: String,
        runtime_max_use: String,
    },
    /// The fragment was written and journald restarted.
    Updated {
        system_max_use: String,
        runtime_max_use: String,
    },
    /// Logging config is disabled and our fragment was removed.
    Removed,
    /// Logging config is disabled and there was no fragment to remove.
    AlreadyDefault,
}

/// Enforces [`LogConfig`] on the host's journald.
pub struct JournaldEnforcer<R = SystemCommandRunner> {
    conf_path: PathBuf,
    runner: R,
}

impl JournaldEnforcer<SystemCommandRunner> {
    /// Enforcer for the host mounted at `root` (normally `/`).
    pub fn system(root: &Path) -> Self {
        Self::under_root(root, SystemCommandRunner)
    }
}

impl<R: CommandRunner> JournaldEnforcer<R> {
    pub fn new(conf_path: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            conf_path: conf_path.into(),
            runner,
        }
    }

    pub fn under_root(root: &Path, runner: R) -> Self {
        Self::new(root.join(JOURNALD_CONF_PATH), runner)
    }

    pub fn conf_path(&self) -> &Path {
        &self.conf_path
    }

    /// Apply `cfg`, logging the result. Failures are logged and never
    /// propagated.
    pub async fn enforce(&self, cfg: &LogConfig) {
        match self.apply(cfg).await {
            Ok(LoggingOutcome::Updated {
                system_max_use,
                runtime_max_use,
            }) => info!(
                path = %self.conf_path.display(),
                %system_max_use,
                %runtime_max_use,
                "updated journald size limits"
            ),
            Ok(LoggingOutcome::Removed) => info!(
                path = %self.conf_path.display(),
                "logging config disabled, removed customized journald settings"
            ),
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to enforce logging config"),
        }
    }

    /// Reconcile the journald fragment with `cfg`.
    pub async fn apply(&self, cfg: &LogConfig) -> Result<LoggingOutcome, LoggingError> {
        if cfg.disable {
            if !remove_file_if_exists(&self.conf_path)? {
                return Ok(LoggingOutcome::AlreadyDefault);
            }
            self.check_journald_enabled().await?;
            self.restart_journald().await?;
            return Ok(LoggingOutcome::Removed);
        }

        self.check_journald_enabled().await?;

        let system_max_use = limit_or_default(&cfg.system_max_use);
        let runtime_max_use = limit_or_default(&cfg.runtime_max_use);
        if !(is_valid_size(&system_max_use) && is_valid_size(&runtime_max_use)) {
            return Err(LoggingError::InvalidSizeLimit {
                system_max_use,
                runtime_max_use,
            });
        }

        let contents = render_journald_conf(&system_max_use, &runtime_max_use);
        let written = match write_file_if_new(&self.conf_path, contents.as_bytes()) {
            Ok(written) => written,
            Err(e) => {
                // A partial write is worse than no fragment at all.
                self.discard_fragment(&e);
                return Err(e.into());
            }
        };

        if !written {
            return Ok(LoggingOutcome::Unchanged {
                system_max_use,
                runtime_max_use,
            });
        }

        self.restart_journald().await?;
        Ok(LoggingOutcome::Updated {
            system_max_use,
            runtime_max_use,
        })
    }

    fn discard_fragment(&self, cause: &FileError) {
        if matches!(cause, FileError::Read { .. }) {
            return;
        }
        if let Err(e) = remove_file_if_exists(&self.conf_path) {
            error!(error = %e, "failed to remove partially written journald fragment");
        }
    }

    async fn check_journald_enabled(&self) -> Result<(), LoggingError> {
        self.runner
            .run("systemctl", &["is-enabled", "systemd-journald"])
            .await
            .map(|_| ())
            .map_err(LoggingError::JournaldUnavailable)
    }

    async fn restart_journald(&self) -> Result<(), LoggingError> {
        self.runner
            .run("systemctl", &["restart", "systemd-journald"])
            .await
            .map(|_| ())
            .map_err(LoggingError::Restart)
    }
}

fn limit_or_default(value: &str) -> String {
    if value.is_empty() {
        DEFAULT_LOG_LIMIT.to_string()
    } else {
        value.to_string()
    }
}

/// Whether `value` is a journald size: digits plus one `K`/`M`/`G`/`T`/`P`/`E`.
pub fn is_valid_size(value: &str) -> bool {
    SIZE_LIMIT.is_match(value)
}

/// Render the journald drop-in for the given limits.
pub fn render_journald_conf(system_max_use: &str, runtime_max_use: &str) -> String {
    format!("[Journal]\nSystemMaxUse={system_max_use}\nRuntimeMaxUse={runtime_max_use}\n")
}
