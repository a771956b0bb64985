//! Unattended OS upgrades for Debian hosts.
//!
//! Depending on [`UpgradePolicy`], either turns the apt periodic upgrade off
//! or installs `unattended-upgrades`, generates its `Origins-Pattern` from
//! the host's apt sources and enables the daily upgrade timer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use tracing::{debug, error, info, warn};

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::{UpgradePolicy, UpgradesConfig};
use crate::errors::UpgradesError;
use crate::files::write_file_if_new;
use crate::lifecycle::Lifecycle;

pub const OS_RELEASE_PATH: &str = "etc/os-release";
pub const AUTO_UPGRADES_PATH: &str = "etc/apt/apt.conf.d/20auto-upgrades";
pub const UNATTENDED_UPGRADES_PATH: &str = "etc/apt/apt.conf.d/50unattended-upgrades";

pub const AUTO_UPGRADES_ENABLED: &str =
    "APT::Periodic::Update-Package-Lists \"1\";\nAPT::Periodic::Unattended-Upgrade \"1\";\n";
pub const AUTO_UPGRADES_DISABLED: &str =
    "APT::Periodic::Update-Package-Lists \"1\";\nAPT::Periodic::Unattended-Upgrade \"0\";\n";

/// Debian codenames we know how to configure.
const SUPPORTED_CODENAMES: &[&str] = &["bookworm", "bullseye"];

/// Upper bound for answering healthchecks while apt installs the package.
/// Slow links can make `apt update` take a long time.
const INSTALL_HEALTHCHECK_WINDOW: Duration = Duration::from_secs(60 * 60);

static RELEASE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"release.*o=([^,]+).*n=([^,]+).*").expect("release pattern is valid")
});

/// What [`UpgradesEnforcer::apply`] did to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradesOutcome {
    /// No policy configured; the host was not inspected.
    Skipped,
    Disabled { changed: bool },
    Enabled { security_only: bool, changed: bool },
}

/// Host paths touched by the upgrades enforcer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePaths {
    pub os_release: PathBuf,
    pub auto_upgrades: PathBuf,
    pub unattended_upgrades: PathBuf,
}

impl UpgradePaths {
    pub fn under_root(root: &Path) -> Self {
        Self {
            os_release: root.join(OS_RELEASE_PATH),
            auto_upgrades: root.join(AUTO_UPGRADES_PATH),
            unattended_upgrades: root.join(UNATTENDED_UPGRADES_PATH),
        }
    }
}

/// Enforces [`UpgradesConfig`] using apt and systemd.
pub struct UpgradesEnforcer<R = SystemCommandRunner> {
    paths: UpgradePaths,
    runner: R,
}

impl UpgradesEnforcer<SystemCommandRunner> {
    pub fn system(root: &Path) -> Self {
        Self::new(UpgradePaths::under_root(root), SystemCommandRunner)
    }
}

impl<R: CommandRunner> UpgradesEnforcer<R> {
    pub fn new(paths: UpgradePaths, runner: R) -> Self {
        Self { paths, runner }
    }

    pub fn paths(&self) -> &UpgradePaths {
        &self.paths
    }

    /// Apply `cfg`, logging the result. Failures are logged and never
    /// propagated.
    pub async fn enforce(&self, cfg: &UpgradesConfig, lifecycle: &Lifecycle) {
        match self.apply(cfg, lifecycle).await {
            Ok(UpgradesOutcome::Disabled { changed: true }) => info!("disabled OS auto-upgrades"),
            Ok(UpgradesOutcome::Enabled {
                security_only: true,
                changed: true,
            }) => info!("enabled OS auto-upgrades (security only)"),
            Ok(UpgradesOutcome::Enabled {
                security_only: false,
                changed: true,
            }) => info!("enabled OS auto-upgrades (full)"),
            Ok(outcome) => debug!(?outcome, "upgrade policy already in effect"),
            Err(UpgradesError::Cancelled { step }) => {
                warn!(step, "upgrade policy enforcement interrupted by shutdown")
            }
            Err(e) => error!(error = %e, "failed to enforce upgrades config"),
        }
    }

    /// Reconcile the apt configuration with `cfg`.
    pub async fn apply(
        &self,
        cfg: &UpgradesConfig,
        lifecycle: &Lifecycle,
    ) -> Result<UpgradesOutcome, UpgradesError> {
        let security_only = match &cfg.policy {
            UpgradePolicy::Unset => return Ok(UpgradesOutcome::Skipped),
            UpgradePolicy::Unknown(value) => {
                return Err(UpgradesError::UnknownPolicy {
                    value: value.clone(),
                })
            }
            // Shutdown may have arrived while journald was being enforced.
            _ if lifecycle.is_cancelled() => {
                return Err(UpgradesError::Cancelled { step: "start" })
            }
            UpgradePolicy::Disable => {
                self.check_supported_distro()?;
                let changed = write_file_if_new(
                    &self.paths.auto_upgrades,
                    AUTO_UPGRADES_DISABLED.as_bytes(),
                )?;
                return Ok(UpgradesOutcome::Disabled { changed });
            }
            UpgradePolicy::Security => true,
            UpgradePolicy::All => false,
        };

        self.check_supported_distro()?;

        if let Err(e) = self.runner.run("unattended-upgrade", &["-h"]).await {
            debug!(error = %e, "unattended-upgrades not installed");
            self.install(lifecycle).await?;
        }

        let policy = self
            .runner
            .run("apt-cache", &["policy"])
            .await
            .map_err(UpgradesError::Origins)?;
        let origins = render_origins(&parse_origins(&policy, security_only));

        let changed_periodic =
            write_file_if_new(&self.paths.auto_upgrades, AUTO_UPGRADES_ENABLED.as_bytes())?;
        let changed_origins =
            write_file_if_new(&self.paths.unattended_upgrades, origins.as_bytes())?;

        self.runner
            .run("systemctl", &["enable", "apt-daily-upgrade.timer"])
            .await
            .map_err(UpgradesError::EnableTimer)?;

        Ok(UpgradesOutcome::Enabled {
            security_only,
            changed: changed_periodic || changed_origins,
        })
    }

    fn check_supported_distro(&self) -> Result<(), UpgradesError> {
        let os_release =
            std::fs::read_to_string(&self.paths.os_release).map_err(|source| {
                UpgradesError::OsRelease {
                    path: self.paths.os_release.clone(),
                    source,
                }
            })?;

        if is_supported_distro(&os_release) {
            Ok(())
        } else {
            Err(UpgradesError::UnsupportedDistro)
        }
    }

    /// `apt update` + `apt install`, answering healthchecks in the
    /// background until both finish. Shutdown kills the running command.
    async fn install(&self, lifecycle: &Lifecycle) -> Result<(), UpgradesError> {
        info!("installing unattended-upgrades");

        let keepalive = lifecycle.scoped();
        let sleeper = keepalive.clone();
        let healthchecks =
            tokio::spawn(async move { sleeper.healthy_sleep(INSTALL_HEALTHCHECK_WINDOW).await });

        let result = async {
            self.run_cancellable(lifecycle, "apt", &["update"]).await?;
            self.run_cancellable(lifecycle, "apt", &["install", "-y", "unattended-upgrades"])
                .await
        }
        .await
        .map(|_| ());

        keepalive.shutdown();
        if let Err(e) = healthchecks.await {
            debug!(error = %e, "install healthcheck task ended abnormally");
        }

        result
    }

    async fn run_cancellable(
        &self,
        lifecycle: &Lifecycle,
        program: &str,
        args: &[&str],
    ) -> Result<String, UpgradesError> {
        tokio::select! {
            biased;
            _ = lifecycle.cancelled() => {
                Err(UpgradesError::Cancelled { step: step_name(program, args) })
            }
            result = self.runner.run(program, args) => {
                result.map_err(UpgradesError::Install)
            }
        }
    }
}

fn step_name(program: &str, args: &[&str]) -> &'static str {
    match (program, args.first()) {
        ("apt", Some(&"update")) => "apt update",
        ("apt", Some(&"install")) => "apt install",
        _ => "install",
    }
}

/// Whether an os-release file describes a supported Debian release.
pub fn is_supported_distro(os_release: &str) -> bool {
    os_release.lines().any(|line| {
        line.strip_prefix("VERSION_CODENAME=")
            .map(|codename| SUPPORTED_CODENAMES.contains(&codename.trim().trim_matches('"')))
            .unwrap_or(false)
    })
}

/// One `origin=...,codename=...` pair from `apt-cache policy`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseOrigin {
    pub origin: String,
    pub codename: String,
}

/// Extract the unique release origins from `apt-cache policy` output,
/// keeping only security codenames when `security_only` is set.
pub fn parse_origins(apt_cache_policy: &str, security_only: bool) -> BTreeSet<ReleaseOrigin> {
    RELEASE_LINE
        .captures_iter(apt_cache_policy)
        .filter_map(|caps| {
            let origin = caps.get(1)?.as_str().to_string();
            let codename = caps.get(2)?.as_str().to_string();
            Some(ReleaseOrigin { origin, codename })
        })
        .filter(|release| !security_only || release.codename.contains("security"))
        .collect()
}

/// Render the `Origins-Pattern` block for `50unattended-upgrades`.
pub fn render_origins(origins: &BTreeSet<ReleaseOrigin>) -> String {
    let mut out = String::from("Unattended-Upgrade::Origins-Pattern {");
    for release in origins {
        out.push_str(&format!(
            "\n    \"origin={},codename={}\";",
            release.origin, release.codename
        ));
    }
    out.push_str("\n};\n");
    out
}
