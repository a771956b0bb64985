//! Shared helpers for the core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_syscfg_core::command::{command_line, CommandRunner};
use agent_syscfg_core::errors::CommandError;
use agent_syscfg_core::lifecycle::LivenessReporter;

pub const BOOKWORM_OS_RELEASE: &str = "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nNAME=\"Debian GNU/Linux\"\nVERSION_ID=\"12\"\nVERSION_CODENAME=bookworm\nID=debian\n";

pub const APT_CACHE_POLICY: &str = "Package files:
 100 /var/lib/dpkg/status
     release a=now
 500 http://deb.debian.org/debian-security bookworm-security/main arm64 Packages
     release v=12,o=Debian,a=stable-security,n=bookworm-security,l=Debian-Security,c=main,b=arm64
     origin deb.debian.org
 500 http://deb.debian.org/debian bookworm/main arm64 Packages
     release v=12.5,o=Debian,a=stable,n=bookworm,l=Debian,c=main,b=arm64
     origin deb.debian.org
Pinned packages:
";

#[derive(Default)]
struct Script {
    calls: Vec<String>,
    outputs: HashMap<String, String>,
    failures: HashMap<String, (i32, String)>,
    delays: HashMap<String, Duration>,
}

/// A [`CommandRunner`] that records every command and answers from a
/// script instead of touching the host. Unscripted commands succeed with
/// empty output.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, output: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .outputs
            .insert(command.to_string(), output.to_string());
        self
    }

    pub fn fail(&self, command: &str, exit_code: i32, output: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .failures
            .insert(command.to_string(), (exit_code, output.to_string()));
        self
    }

    pub fn delay(&self, command: &str, delay: Duration) -> &Self {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(command.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = command_line(program, args);
        let (delay, failure, output) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(command.clone());
            (
                script.delays.get(&command).copied(),
                script.failures.get(&command).cloned(),
                script.outputs.get(&command).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some((exit_code, output)) => Err(CommandError::Failed {
                command,
                exit_code,
                output,
            }),
            None => Ok(output.unwrap_or_default()),
        }
    }
}

/// Counts liveness reports instead of printing them.
#[derive(Default)]
pub struct CountingReporter(AtomicUsize);

impl CountingReporter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl LivenessReporter for CountingReporter {
    fn report(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn write_os_release(root: &Path, contents: &str) {
    let path = root.join("etc/os-release");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
