//! agent-syscfg entry point.
//!
//! Loads configuration, enforces journald limits and the upgrade policy,
//! then idles answering healthchecks until a terminate signal arrives.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use agent_syscfg_core::config::DEFAULT_CONFIG_PATH;
use agent_syscfg_core::version::version_banner;
use agent_syscfg_core::{JournaldEnforcer, Lifecycle, SyscfgConfig, UpgradesEnforcer};

/// How long each idle sleep lasts before the loop checks in again.
const IDLE_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Runs as a background service and manages system configuration for the
/// device agent.
#[derive(Parser, Debug)]
#[command(name = "agent-syscfg", about, disable_version_flag = true)]
struct Args {
    /// Path to config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Show version.
    #[arg(short = 'v', long)]
    version: bool,

    /// Root of the host filesystem to manage.
    #[arg(long, default_value = "/", hide = true)]
    root: PathBuf,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("{}", version_banner());
        return Ok(());
    }

    init_tracing(args.debug);

    let lifecycle = Lifecycle::with_stdout();
    let listener = start_signal_listener(&lifecycle);

    let config = match SyscfgConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "using default configuration");
            SyscfgConfig::default()
        }
    };
    debug!(?config, "loaded configuration");

    JournaldEnforcer::system(&args.root)
        .enforce(&config.logging)
        .await;

    // The parent agent watches for this exact text to detect a successful
    // start. Do not change it.
    info!("agent-syscfg startup complete");

    UpgradesEnforcer::system(&args.root)
        .enforce(&config.upgrades, &lifecycle)
        .await;

    // Nothing else to do; keep answering healthchecks until told to stop.
    while lifecycle.healthy_sleep(IDLE_INTERVAL).await {}

    if let Some(listener) = listener {
        if let Err(e) = listener.await {
            warn!(error = %e, "signal listener task error");
        }
    }

    info!("agent-syscfg subsystem exiting");
    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

#[cfg(unix)]
fn start_signal_listener(lifecycle: &Lifecycle) -> Option<tokio::task::JoinHandle<()>> {
    match agent_syscfg_core::signals::install(lifecycle.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "failed to register signal handlers");
            None
        }
    }
}

#[cfg(not(unix))]
fn start_signal_listener(_lifecycle: &Lifecycle) -> Option<tokio::task::JoinHandle<()>> {
    error!("signal handling is only supported on unix");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["agent-syscfg"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/opt/viam/etc/agent-syscfg.json"));
        assert!(!args.debug);
        assert!(!args.version);
        assert_eq!(args.root, PathBuf::from("/"));
    }

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from(["agent-syscfg", "-c", "/tmp/x.json", "-d", "-v"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/tmp/x.json"));
        assert!(args.debug);
        assert!(args.version);
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        assert!(Args::try_parse_from(["agent-syscfg", "--bogus"]).is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = Args::try_parse_from(["agent-syscfg", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
