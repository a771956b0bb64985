//! Build information embedded at compile time.
//!
//! Release builds set `AGENT_SYSCFG_VERSION` and `AGENT_SYSCFG_GIT_REVISION`
//! in the environment of `cargo build`.

/// Version embedded at build time, or `custom` for local builds.
pub fn version() -> &'static str {
    match option_env!("AGENT_SYSCFG_VERSION") {
        Some(v) if !v.is_empty() => v,
        _ => "custom",
    }
}

/// Git revision embedded at build time, or `unknown`.
pub fn git_revision() -> &'static str {
    match option_env!("AGENT_SYSCFG_GIT_REVISION") {
        Some(rev) if !rev.is_empty() => rev,
        _ => "unknown",
    }
}

/// Text printed by `--version`.
pub fn version_banner() -> String {
    format!("Version: {}\nGit Revision: {}", version(), git_revision())
}
