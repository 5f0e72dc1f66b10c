/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::report
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Persist the outcome of a check as a JSON report, and load
    it back so later invocations can resolve packages without
    re-running the privileged check.

  Security / Safety Notes:
    Reports are written to operator-controlled paths; no
    privileged operations are performed.

  Dependencies:
    serde + serde_json for the document, chrono for stamps.

  Operational Scope:
    Written after `check`, read by `lookup`.

  Revision History:
    2026-10-16 COD  Derived from the manifest writer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Entries kept in pipeline order
    - Rich metadata for audit and observability
============================================================*/

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffOrigin;
use crate::error::{Result, VsoError};
use crate::plugin::CheckOutcome;
use crate::reconcile::{EntryCache, LifecycleState, UpdateEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub metadata: ReportMetadata,
    pub entries: Vec<UpdateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub generated_by: String,
    pub has_update: bool,
    pub new_digest: Option<String>,
    pub total_entries: usize,
    pub updatable: usize,
    pub available: usize,
    pub unavailable: usize,
    pub overlay_entries: usize,
}

impl UpdateReport {
    pub fn from_outcome(outcome: &CheckOutcome) -> Self {
        let count = |state: LifecycleState| {
            outcome
                .entries
                .iter()
                .filter(|entry| entry.state == state)
                .count()
        };
        let metadata = ReportMetadata {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            generated_by: "vso_bridge".to_string(),
            has_update: outcome.has_update,
            new_digest: outcome.new_digest.clone(),
            total_entries: outcome.entries.len(),
            updatable: count(LifecycleState::Updatable),
            available: count(LifecycleState::Available),
            unavailable: count(LifecycleState::Unavailable),
            overlay_entries: outcome
                .entries
                .iter()
                .filter(|entry| entry.origin == DiffOrigin::Overlay)
                .count(),
        };
        Self {
            metadata,
            entries: outcome.entries.clone(),
        }
    }

    /// Replay the report into `cache` in its original order.
    pub fn seed(&self, cache: &EntryCache) {
        for entry in &self.entries {
            cache.insert(entry.clone());
        }
    }
}

/// Persist the report to the given path.
pub fn write_report(report: &UpdateReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            VsoError::Filesystem(format!(
                "Failed to create report directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|err| {
        VsoError::Filesystem(format!(
            "Failed to create report file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, report).map_err(|err| {
        VsoError::Filesystem(format!("Failed to write report {}: {err}", path.display()))
    })?;
    Ok(())
}

/// Like [`read_report`], but a report that was never written is `None`.
pub fn load_report_if_present(path: &Path) -> Result<Option<UpdateReport>> {
    match path.try_exists() {
        Ok(false) => Ok(None),
        Ok(true) => read_report(path).map(Some),
        Err(err) => Err(VsoError::Filesystem(format!(
            "Failed to inspect report {}: {err}",
            path.display()
        ))),
    }
}

pub fn read_report(path: &Path) -> Result<UpdateReport> {
    let file = File::open(path).map_err(|err| {
        VsoError::Filesystem(format!("Failed to open report {}: {err}", path.display()))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        VsoError::Serialization(format!("Failed to decode report {}: {err}", path.display()))
    })
}
