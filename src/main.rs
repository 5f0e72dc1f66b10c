/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for VSO Bridge. Asks the Vanilla System
    Operator for pending image changes, maps them onto software
    centre app records, and gates upgrade application behind
    the transaction lock.

  Security / Safety Notes:
    Check and apply run the upgrade tool through the configured
    escalator (pkexec by default). `parse`, `history` and
    `lookup` never spawn processes.

  Dependencies:
    clap for CLI parsing, chrono for session stamps, tokio for
    the runtime.

  Operational Scope:
    Invoked by the software centre integration or by operators
    inspecting pending upgrades by hand.

  Revision History:
    2026-10-16 COD  Authored VSO Bridge runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod config;
mod diff;
mod error;
mod host;
mod logger;
mod plugin;
mod reconcile;
mod report;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use tokio::io::AsyncReadExt;

use config::BridgeConfig;
use diff::PayloadFormat;
use error::{Result, VsoError};
use host::{AppList, AppRecord, AppState, UpdateSink};
use logger::Logger;
use plugin::{CheckOutcome, VsoPlugin};
use report::{load_report_if_present, write_report, UpdateReport};
use runner::RawDiffPayload;

/// Command-line arguments for VSO Bridge.
#[derive(Debug, Parser)]
#[command(
    name = "VSO-Bridge",
    version,
    author = "Synavera Systems",
    about = "Software centre bridge for VSO system upgrades"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the upgrade tool for pending changes.
    Check {
        /// Override report output path.
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
        /// Do not write the report.
        #[arg(long, action = ArgAction::SetTrue)]
        no_report: bool,
        /// Print app records as JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Apply the pending upgrade.
    Apply,
    /// Map a saved check payload without running the upgrade tool.
    Parse {
        /// Payload file; stdin when omitted.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
        /// Payload shape; defaults to the configured format.
        #[arg(long, value_enum)]
        format: Option<PayloadFormat>,
        /// Print app records as JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List updates already applied to this system.
    History {
        /// Print app records as JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Resolve a package from the last check report.
    Lookup {
        name: String,
        /// Override report path.
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[VSO-Bridge] {}", err);
            if err.is_execution() {
                eprintln!("[VSO-Bridge] The upgrade tool did not complete; no retry was attempted.");
            }
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = BridgeConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .or_else(|| Some(config.log_dir().join(format!("bridge_{session_stamp}.log"))));
    let logger = Logger::new(log_path, cli.verbose)?;
    logger.info("INIT", "VSO Bridge awakening.");

    let plugin = VsoPlugin::new(config.clone());
    let code = match cli.command {
        Command::Check {
            report,
            no_report,
            json,
        } => {
            let mut list = AppList::new(plugin.cache().clone());
            let outcome = plugin.add_updates(&mut list, &logger).await?;
            render(&list, &outcome, json)?;
            if !no_report {
                let report_path = report.unwrap_or_else(|| config.report_path());
                write_report(&UpdateReport::from_outcome(&outcome), &report_path)?;
                logger.info(
                    "REPORT",
                    format!("Report written to {}", report_path.display()),
                );
            }
            ExitCode::SUCCESS
        }
        Command::Apply => {
            plugin.apply_upgrade(&logger).await?;
            println!("→ Upgrade staged. Reboot to boot into the new image.");
            ExitCode::SUCCESS
        }
        Command::Parse { file, format, json } => {
            let payload = read_payload(file.as_deref()).await?;
            let format = format.unwrap_or(config.command.format);
            let mut list = AppList::new(plugin.cache().clone());
            let outcome = plugin.ingest(&payload, format, &mut list, &logger).await?;
            render(&list, &outcome, json)?;
            ExitCode::SUCCESS
        }
        Command::History { json } => {
            let mut list = AppList::new(plugin.cache().clone());
            for entry in plugin.add_updates_historical() {
                list.submit(entry);
            }
            if json || !list.is_empty() {
                render(&list, &CheckOutcome::default(), json)?;
            } else {
                println!("→ The upgrade tool keeps no record of past upgrades.");
            }
            ExitCode::SUCCESS
        }
        Command::Lookup { name, report } => {
            let report_path = report.unwrap_or_else(|| config.report_path());
            match load_report_if_present(&report_path)? {
                Some(last) => last.seed(plugin.cache()),
                None => logger.info(
                    "REPORT",
                    format!("No check report at {}", report_path.display()),
                ),
            }
            let list = AppList::new(plugin.cache().clone());
            match list.lookup(&name) {
                Some(entry) => {
                    println!("{}", AppRecord::from(&entry));
                    ExitCode::SUCCESS
                }
                None => {
                    logger.warn(
                        "PKG404",
                        format!("{name} is not part of the last check"),
                    );
                    ExitCode::from(1)
                }
            }
        }
    };

    logger.info("COMPLETE", "Bridge session closed.");
    logger.finalize()?;
    Ok(code)
}

async fn read_payload(file: Option<&std::path::Path>) -> Result<RawDiffPayload> {
    let bytes = match file {
        Some(path) => tokio::fs::read(path).await.map_err(|err| {
            VsoError::Filesystem(format!("Failed to read payload {}: {err}", path.display()))
        })?,
        None => {
            let mut buffer = Vec::new();
            tokio::io::stdin().read_to_end(&mut buffer).await?;
            buffer
        }
    };
    Ok(RawDiffPayload::new(bytes))
}

fn render(list: &AppList, outcome: &CheckOutcome, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(list.apps()).map_err(|err| {
            VsoError::Serialization(format!("Failed to render app records: {err}"))
        })?;
        println!("{rendered}");
        return Ok(());
    }

    if list.is_empty() {
        println!("→ System image is up to date.");
        return Ok(());
    }
    for app in list.apps() {
        println!("  {app}");
    }
    println!(
        "→ Updatable={} New={} Removed={} Digest={} (reboot required)",
        list.with_state(AppState::Updatable).count(),
        list.with_state(AppState::Available).count(),
        list.with_state(AppState::Unavailable).count(),
        outcome.new_digest.as_deref().unwrap_or("unknown")
    );
    Ok(())
}
