/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::runner
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Spawn the privileged upgrade tool, drain its standard
    output to completion, and report execution failures.

  Security / Safety Notes:
    Commands usually run behind pkexec and may mutate the
    system; each call spawns exactly one child and never
    retries.

  Dependencies:
    tokio::process for async command execution, tokio::time
    for the optional deadline.

  Operational Scope:
    Invoked by the plugin layer for the update check query and
    the upgrade apply command.

  Revision History:
    2026-10-16 COD  Derived from the pacman integration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic command invocation with explicit checks
    - Stdout-only capture; stderr kept out of payloads
    - Reusable helpers for external command diagnostics
============================================================*/

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Result, VsoError};

/// Stdout of the check command, fully drained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDiffPayload(Vec<u8>);

impl RawDiffPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Executes argument vectors as child processes, one at a time per call.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    deadline: Option<Duration>,
}

impl CommandRunner {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self { deadline }
    }

    /// Run a query command and return its stdout.
    ///
    /// Exit codes are not inspected: a check that finds nothing may exit
    /// non-zero with empty output, which callers treat as "no updates".
    /// A child terminated by a signal is an execution failure.
    pub async fn capture(&self, argv: &[String]) -> Result<RawDiffPayload> {
        let output = self.spawn_and_wait(argv, Stdio::piped()).await?;
        if output.status.code().is_none() {
            let signal = output
                .status
                .signal()
                .map(|sig| sig.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(VsoError::Execution {
                command: display_command(argv),
                detail: format!("terminated by signal {signal}"),
            });
        }
        Ok(RawDiffPayload(output.stdout))
    }

    /// Run an imperative command; anything other than a zero exit fails.
    pub async fn execute(&self, argv: &[String]) -> Result<()> {
        let output = self.spawn_and_wait(argv, Stdio::null()).await?;
        if !output.status.success() {
            return Err(VsoError::CommandFailure {
                command: display_command(argv),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn spawn_and_wait(&self, argv: &[String], stdout: Stdio) -> Result<Output> {
        let (program, args) = argv.split_first().ok_or_else(|| VsoError::Execution {
            command: String::new(),
            detail: "empty argument vector".into(),
        })?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| map_spawn_error(err, program))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = match self.deadline {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| VsoError::TimedOut {
                    command: display_command(argv),
                    seconds: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };

        waited.map_err(|err| VsoError::Execution {
            command: display_command(argv),
            detail: format!("failed to collect output: {err}"),
        })
    }
}

pub fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}

fn map_spawn_error(err: io::Error, command: &str) -> VsoError {
    if err.kind() == io::ErrorKind::NotFound {
        VsoError::CommandMissing {
            command: command.into(),
        }
    } else {
        VsoError::Execution {
            command: command.into(),
            detail: format!("failed to spawn: {err}"),
        }
    }
}
