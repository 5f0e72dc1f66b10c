/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load operator configuration describing how the upgrade tool
    is invoked, where the transaction lock lives, and where the
    bridge keeps its reports and logs.

  Security / Safety Notes:
    The escalator and tool are executed verbatim; the config
    file must be owned by the operator invoking the bridge.

  Dependencies:
    serde + toml for parsing, dirs for XDG locations.

  Operational Scope:
    Read once at start-up by the binary and handed to the
    plugin layer by reference.

  Revision History:
    2026-10-16 COD  Authored bridge configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults for every key
    - Fail loudly on explicit but unreadable config paths
============================================================*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::diff::PayloadFormat;
use crate::error::{Result, VsoError};

const APP_DIR: &str = "vso-bridge";
const DEFAULT_LOCK_PATH: &str = "/tmp/abroot-transactions.lock";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub command: CommandConfig,
    pub paths: PathsConfig,
}

/// How the privileged upgrade tool is invoked.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub escalator: String,
    pub tool: String,
    pub check_args: Vec<String>,
    pub apply_args: Vec<String>,
    pub format: PayloadFormat,
    /// Seconds before a running command is killed; 0 disables the deadline.
    pub timeout: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            escalator: "pkexec".into(),
            tool: "vso".into(),
            check_args: vec!["sys-upgrade".into(), "check".into(), "--json".into()],
            apply_args: vec!["sys-upgrade".into(), "upgrade".into()],
            format: PayloadFormat::Json,
            timeout: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub lock_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            report_path: None,
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Load from an explicit path, or from the XDG default when present.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(explicit) => Self::load_from_path(explicit),
            None => match default_config_path() {
                Some(candidate) if candidate.exists() => Self::load_from_path(&candidate),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            VsoError::Config(format!("Failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw).map_err(|err| match err {
            VsoError::Config(message) => {
                VsoError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(raw)
            .map_err(|err| VsoError::Config(format!("Invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.command.tool.trim().is_empty() {
            return Err(VsoError::Config("command.tool must not be empty".into()));
        }
        if self.paths.lock_path.as_os_str().is_empty() {
            return Err(VsoError::Config("paths.lock_path must not be empty".into()));
        }
        Ok(())
    }

    /// Argument vector for the update check query.
    pub fn check_command(&self) -> Vec<String> {
        self.command.compose(&self.command.check_args)
    }

    /// Argument vector for applying the pending upgrade.
    pub fn apply_command(&self) -> Vec<String> {
        self.command.compose(&self.command.apply_args)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.command.timeout > 0).then(|| Duration::from_secs(self.command.timeout))
    }

    pub fn lock_path(&self) -> &Path {
        &self.paths.lock_path
    }

    pub fn report_path(&self) -> PathBuf {
        self.paths
            .report_path
            .clone()
            .unwrap_or_else(|| state_root().join("last-check.json"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| state_root().join("logs"))
    }
}

impl CommandConfig {
    /// An empty escalator runs the tool directly.
    fn compose(&self, args: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        let escalator = self.escalator.trim();
        if !escalator.is_empty() {
            argv.push(escalator.to_string());
        }
        argv.push(self.tool.clone());
        argv.extend(args.iter().cloned());
        argv
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn state_root() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
