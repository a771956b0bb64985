//! End-to-end tests for config loading and journald enforcement against a
//! temporary host root.

mod common;

use std::fs;

use agent_syscfg_core::config::{LogConfig, SyscfgConfig, UpgradePolicy};
use agent_syscfg_core::errors::LoggingError;
use agent_syscfg_core::logging::{JournaldEnforcer, LoggingOutcome, JOURNALD_CONF_PATH};
use agent_syscfg_core::upgrades::{UpgradePaths, UpgradesEnforcer, UpgradesOutcome};
use agent_syscfg_core::Lifecycle;

use common::ScriptedRunner;

const IS_ENABLED: &str = "systemctl is-enabled systemd-journald";
const RESTART: &str = "systemctl restart systemd-journald";

#[tokio::test]
async fn test_missing_config_applies_defaults() {
    let root = tempfile::tempdir().unwrap();
    let config = SyscfgConfig::load(root.path().join("agent-syscfg.json")).unwrap();
    assert_eq!(config, SyscfgConfig::default());

    let runner = ScriptedRunner::new();
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());
    let outcome = journald.apply(&config.logging).await.unwrap();
    assert_eq!(
        outcome,
        LoggingOutcome::Updated {
            system_max_use: "512M".into(),
            runtime_max_use: "512M".into(),
        }
    );
    assert_eq!(
        fs::read_to_string(root.path().join(JOURNALD_CONF_PATH)).unwrap(),
        "[Journal]\nSystemMaxUse=512M\nRuntimeMaxUse=512M\n"
    );
    assert_eq!(runner.calls(), vec![IS_ENABLED, RESTART]);

    // Default upgrade policy touches nothing.
    assert_eq!(config.upgrades.policy, UpgradePolicy::Unset);
    let upgrades_runner = ScriptedRunner::new();
    let upgrades =
        UpgradesEnforcer::new(UpgradePaths::under_root(root.path()), upgrades_runner.clone());
    let outcome = upgrades
        .apply(&config.upgrades, &Lifecycle::with_stdout())
        .await
        .unwrap();
    assert_eq!(outcome, UpgradesOutcome::Skipped);
    assert!(upgrades_runner.calls().is_empty());
    assert!(!root.path().join("etc/apt").exists());
}

#[tokio::test]
async fn test_unchanged_fragment_does_not_restart() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());
    let cfg = LogConfig {
        disable: false,
        system_max_use: "1G".into(),
        runtime_max_use: "64M".into(),
    };

    assert!(matches!(
        journald.apply(&cfg).await.unwrap(),
        LoggingOutcome::Updated { .. }
    ));
    assert_eq!(
        journald.apply(&cfg).await.unwrap(),
        LoggingOutcome::Unchanged {
            system_max_use: "1G".into(),
            runtime_max_use: "64M".into(),
        }
    );
    assert_eq!(runner.calls(), vec![IS_ENABLED, RESTART, IS_ENABLED]);
}

#[tokio::test]
async fn test_disable_removes_existing_fragment() {
    let root = tempfile::tempdir().unwrap();
    let fragment = root.path().join(JOURNALD_CONF_PATH);
    fs::create_dir_all(fragment.parent().unwrap()).unwrap();
    fs::write(&fragment, "[Journal]\nSystemMaxUse=1G\nRuntimeMaxUse=1G\n").unwrap();

    let config: SyscfgConfig = serde_json::from_str(r#"{"logging":{"disable":true}}"#).unwrap();
    let runner = ScriptedRunner::new();
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());

    assert_eq!(
        journald.apply(&config.logging).await.unwrap(),
        LoggingOutcome::Removed
    );
    assert!(!fragment.exists());
    assert_eq!(runner.calls(), vec![IS_ENABLED, RESTART]);
}

#[tokio::test]
async fn test_disable_without_fragment_is_noop() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());
    let cfg = LogConfig {
        disable: true,
        ..LogConfig::default()
    };

    assert_eq!(
        journald.apply(&cfg).await.unwrap(),
        LoggingOutcome::AlreadyDefault
    );
    assert!(runner.calls().is_empty());

    // The logging wrapper must not panic either.
    journald.enforce(&cfg).await;
}

#[tokio::test]
async fn test_journald_not_enabled_skips_feature() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    runner.fail(IS_ENABLED, 1, "Failed to get unit file state for systemd-journald.service");
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());

    let err = journald.apply(&LogConfig::default()).await.unwrap_err();
    assert!(matches!(err, LoggingError::JournaldUnavailable(_)));
    assert!(err.to_string().contains("journald enabled"));
    assert!(!root.path().join(JOURNALD_CONF_PATH).exists());
    assert_eq!(runner.calls(), vec![IS_ENABLED]);

    journald.enforce(&LogConfig::default()).await;
}

#[tokio::test]
async fn test_invalid_size_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());
    let cfg = LogConfig {
        disable: false,
        system_max_use: "lots".into(),
        runtime_max_use: String::new(),
    };

    let err = journald.apply(&cfg).await.unwrap_err();
    match err {
        LoggingError::InvalidSizeLimit {
            system_max_use,
            runtime_max_use,
        } => {
            assert_eq!(system_max_use, "lots");
            assert_eq!(runtime_max_use, "512M");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!root.path().join(JOURNALD_CONF_PATH).exists());
    assert_eq!(runner.calls(), vec![IS_ENABLED]);
}

#[tokio::test]
async fn test_restart_failure_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    runner.fail(RESTART, 1, "Job for systemd-journald.service failed");
    let journald = JournaldEnforcer::under_root(root.path(), runner.clone());

    let err = journald.apply(&LogConfig::default()).await.unwrap_err();
    assert!(matches!(err, LoggingError::Restart(_)));
    assert!(err.to_string().contains("Job for systemd-journald.service failed"));
}
