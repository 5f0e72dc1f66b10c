/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise VSO Bridge error types so the check, apply and
    lookup flows share diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts carry command vectors and paths only; the
    escalator's own prompts never reach these messages.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate failures to the host-facing
    entry points and the binary's exit code.

  Revision History:
    2026-10-16 COD  Split execution, parse and lock failures.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for VSO Bridge operations.
pub type Result<T> = std::result::Result<T, VsoError>;

/// Enumerates high-level error domains surfaced by VSO Bridge.
#[derive(Debug, Error)]
pub enum VsoError {
    #[error("Required command `{command}` not found in PATH")]
    CommandMissing { command: String },
    #[error("Command `{command}` could not be executed: {detail}")]
    Execution { command: String, detail: String },
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    CommandFailure {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Command `{command}` exceeded its {seconds}s deadline and was killed")]
    TimedOut { command: String, seconds: u64 },
    #[error("Parse: {0}")]
    Parse(String),
    #[error(
        "A system transaction is already pending at {}; reboot before applying another upgrade",
        .path.display()
    )]
    Locked { path: PathBuf },
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl VsoError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            VsoError::CommandMissing { .. } => ExitCode::from(10),
            VsoError::Execution { .. } => ExitCode::from(11),
            VsoError::CommandFailure { .. } => ExitCode::from(12),
            VsoError::TimedOut { .. } => ExitCode::from(13),
            VsoError::Config(_) => ExitCode::from(20),
            VsoError::Parse(_) => ExitCode::from(21),
            VsoError::Locked { .. } => ExitCode::from(22),
            VsoError::Serialization(_) => ExitCode::from(31),
            VsoError::Filesystem(_) => ExitCode::from(40),
            VsoError::Io(_) => ExitCode::from(41),
        }
    }

    /// True for failures raised while spawning, draining or awaiting a child.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            VsoError::CommandMissing { .. }
                | VsoError::Execution { .. }
                | VsoError::CommandFailure { .. }
                | VsoError::TimedOut { .. }
        )
    }
}
