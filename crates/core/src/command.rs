//! Running external tools (`systemctl`, `apt`, `apt-cache`, ...).

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::CommandError;

/// Runs a program and returns its combined stdout and stderr.
///
/// The enforcers are generic over this trait so tests can script command
/// results without touching the host.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// Production runner backed by `tokio::process`.
///
/// The child is killed if the returned future is dropped, so callers can
/// abandon a long install on shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = command_line(program, args);
        debug!(cmd = %command, "running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::BinaryNotFound {
                        command: command.clone(),
                    }
                } else {
                    CommandError::Io {
                        command: command.clone(),
                        source: e,
                    }
                }
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(cmd = %command, exit_code, "command failed");
            return Err(CommandError::Failed {
                command,
                exit_code,
                output: combined.trim_end().to_string(),
            });
        }

        Ok(combined)
    }
}

/// Render `program args...` for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
