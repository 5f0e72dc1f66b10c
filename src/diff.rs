/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::diff
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Turn the raw output of the upgrade check into normalised
    package change records, from either the JSON document
    emitted by `sys-upgrade check --json` or the tagged text
    lines of the older `update-check` subcommand.

  Security / Safety Notes:
    Pure parsing; no I/O beyond logging.

  Dependencies:
    serde + serde_json for the structured document, clap for
    exposing the format selector on the command line.

  Operational Scope:
    Sits between the runner and the reconciler on every check.

  Revision History:
    2026-10-16 COD  Authored structured and legacy diff parsers.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Strict parsing for the structured form
    - Skip-and-log for best-effort text lines
    - Deterministic record ordering
============================================================*/

use std::borrow::Cow;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VsoError};
use crate::logger::Logger;
use crate::runner::RawDiffPayload;

const LEGACY_PREFIX: &str = "  - ";
const LEGACY_ARROW: &str = " -> ";

/// Shape of the check command's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Trailing JSON document (`sys-upgrade check --json`).
    #[default]
    Json,
    /// `  - name\told -> new` lines (`update-check`).
    Legacy,
}

/// Which half of the image a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOrigin {
    System,
    Overlay,
}

/// Diff bucket a change was reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    Added,
    Upgraded,
    Downgraded,
    Removed,
}

/// Version transition of a single package. At least one side is always known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    Added { new: String },
    Removed { previous: String },
    Modified { previous: String, new: String },
}

/// One package-level change extracted from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChangeRecord {
    name: String,
    change: VersionChange,
    origin: DiffOrigin,
    category: ChangeCategory,
}

impl PackageChangeRecord {
    /// Build a system-side record, inferring the bucket from the versions.
    ///
    /// Returns `None` when the name is blank or neither version is present.
    #[cfg(test)]
    pub fn new(name: &str, previous: Option<&str>, new: Option<&str>) -> Option<Self> {
        let change = classify(previous, new)?;
        let category = match change {
            VersionChange::Added { .. } => ChangeCategory::Added,
            VersionChange::Removed { .. } => ChangeCategory::Removed,
            VersionChange::Modified { .. } => ChangeCategory::Upgraded,
        };
        Self::from_parts(name, previous, new, DiffOrigin::System, category)
    }

    pub fn from_parts(
        name: &str,
        previous: Option<&str>,
        new: Option<&str>,
        origin: DiffOrigin,
        category: ChangeCategory,
    ) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            change: classify(previous, new)?,
            origin,
            category,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn change(&self) -> &VersionChange {
        &self.change
    }

    pub fn origin(&self) -> DiffOrigin {
        self.origin
    }

    pub fn category(&self) -> ChangeCategory {
        self.category
    }

    pub fn previous_version(&self) -> Option<&str> {
        match &self.change {
            VersionChange::Removed { previous } | VersionChange::Modified { previous, .. } => {
                Some(previous)
            }
            VersionChange::Added { .. } => None,
        }
    }

    pub fn new_version(&self) -> Option<&str> {
        match &self.change {
            VersionChange::Added { new } | VersionChange::Modified { new, .. } => Some(new),
            VersionChange::Removed { .. } => None,
        }
    }
}

fn classify(previous: Option<&str>, new: Option<&str>) -> Option<VersionChange> {
    let previous = previous.map(str::trim).filter(|v| !v.is_empty());
    let new = new.map(str::trim).filter(|v| !v.is_empty());
    match (previous, new) {
        (Some(previous), Some(new)) => Some(VersionChange::Modified {
            previous: previous.to_string(),
            new: new.to_string(),
        }),
        (None, Some(new)) => Some(VersionChange::Added {
            new: new.to_string(),
        }),
        (Some(previous), None) => Some(VersionChange::Removed {
            previous: previous.to_string(),
        }),
        (None, None) => None,
    }
}

/// Normalised result of parsing one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiff {
    pub has_update: bool,
    pub new_digest: Option<String>,
    pub records: Vec<PackageChangeRecord>,
}

/// Parse a payload in the configured format.
pub fn parse_payload(
    payload: &RawDiffPayload,
    format: PayloadFormat,
    logger: &Logger,
) -> Result<ParsedDiff> {
    match format {
        PayloadFormat::Json => {
            let text = std::str::from_utf8(payload.as_bytes()).map_err(|err| {
                VsoError::Parse(format!("update check emitted invalid UTF-8: {err}"))
            })?;
            parse_structured(text, logger)
        }
        PayloadFormat::Legacy => {
            // Newlines never occur inside a multi-byte sequence, so lossy
            // decoding confines replacement characters to their own line.
            let text = String::from_utf8_lossy(payload.as_bytes());
            if let Cow::Owned(_) = text {
                logger.warn("DIFF", "Update check output contains invalid UTF-8; decoding lossily");
            }
            Ok(parse_legacy(&text, logger))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCheckDocument {
    has_update: bool,
    #[serde(default)]
    new_digest: Option<String>,
    #[serde(default)]
    system_package_diff: Option<PackageDiff>,
    #[serde(default)]
    overlay_package_diff: Option<PackageDiff>,
}

// Empty buckets may arrive as `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageDiff {
    added: Option<Vec<PackageInfo>>,
    upgraded: Option<Vec<PackageInfo>>,
    downgraded: Option<Vec<PackageInfo>>,
    removed: Option<Vec<PackageInfo>>,
}

impl PackageDiff {
    fn into_buckets(self) -> [(ChangeCategory, Vec<PackageInfo>); 4] {
        [
            (ChangeCategory::Added, self.added.unwrap_or_default()),
            (ChangeCategory::Upgraded, self.upgraded.unwrap_or_default()),
            (ChangeCategory::Downgraded, self.downgraded.unwrap_or_default()),
            (ChangeCategory::Removed, self.removed.unwrap_or_default()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageInfo {
    name: Option<String>,
    previous_version: Option<String>,
    new_version: Option<String>,
}

/// Parse the JSON document on the last non-blank line of `text`.
pub fn parse_structured(text: &str, logger: &Logger) -> Result<ParsedDiff> {
    let Some(document_line) = text.lines().rev().find(|line| !line.trim().is_empty()) else {
        logger.debug("DIFF", "Update check produced no output");
        return Ok(ParsedDiff::default());
    };

    let document: UpdateCheckDocument = serde_json::from_str(document_line.trim())
        .map_err(|err| VsoError::Parse(format!("Failed to decode update check JSON: {err}")))?;

    let mut parsed = ParsedDiff {
        has_update: document.has_update,
        new_digest: document.new_digest.filter(|digest| !digest.is_empty()),
        records: Vec::new(),
    };
    if !parsed.has_update {
        logger.debug("DIFF", "Upgrade tool reports no pending update");
        return Ok(parsed);
    }

    let sources = [
        (DiffOrigin::System, document.system_package_diff),
        (DiffOrigin::Overlay, document.overlay_package_diff),
    ];
    for (origin, diff) in sources {
        for (category, infos) in diff.unwrap_or_default().into_buckets() {
            for info in infos {
                let name = info.name.as_deref().unwrap_or_default();
                match PackageChangeRecord::from_parts(
                    name,
                    info.previous_version.as_deref(),
                    info.new_version.as_deref(),
                    origin,
                    category,
                ) {
                    Some(record) => {
                        log_record(logger, &record);
                        parsed.records.push(record);
                    }
                    None => logger.warn(
                        "DIFF",
                        format!(
                            "Skipping {origin:?}/{category:?} entry `{name}` without name or versions"
                        ),
                    ),
                }
            }
        }
    }

    Ok(parsed)
}

/// Parse `  - name\told -> new` lines; anything else is ignored.
pub fn parse_legacy(text: &str, logger: &Logger) -> ParsedDiff {
    let mut records = Vec::new();
    for line in text.lines() {
        let Some(body) = line.strip_prefix(LEGACY_PREFIX) else {
            continue;
        };
        let Some((name, transition)) = body.split_once('\t') else {
            logger.warn("DIFF", format!("Skipping line without tab separator: `{body}`"));
            continue;
        };
        let Some((previous, new)) = transition.split_once(LEGACY_ARROW) else {
            logger.warn(
                "DIFF",
                format!("Skipping `{name}`: version field lacks `->`: `{transition}`"),
            );
            continue;
        };
        match PackageChangeRecord::from_parts(
            name,
            Some(previous),
            Some(new),
            DiffOrigin::System,
            ChangeCategory::Upgraded,
        ) {
            Some(record) => {
                log_record(logger, &record);
                records.push(record);
            }
            None => logger.warn("DIFF", format!("Skipping incomplete line: `{body}`")),
        }
    }

    ParsedDiff {
        has_update: !records.is_empty(),
        new_digest: None,
        records,
    }
}

fn log_record(logger: &Logger, record: &PackageChangeRecord) {
    logger.debug(
        "DIFF",
        format!(
            "{} {} -> {}",
            record.name(),
            record.previous_version().unwrap_or("-"),
            record.new_version().unwrap_or("-")
        ),
    );
}
