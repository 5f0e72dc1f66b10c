/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::host
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Describe the seam between the ingestion pipeline and the
    package manager hosting it: where entries are submitted,
    how they are looked up again, and how each one maps onto
    the host's app record.

  Security / Safety Notes:
    Data mapping only.

  Dependencies:
    serde for JSON rendering of app records.

  Operational Scope:
    Implemented by `AppList` for the bundled CLI; other hosts
    provide their own `UpdateSink`.

  Revision History:
    2026-10-16 COD  Introduced host seam and app record mapping.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Fixed host attributes for every record
    - Lookups never block on a running check
============================================================*/

use std::fmt;

use serde::Serialize;

use crate::reconcile::{EntryCache, LifecycleState, UpdateEntry};

/// Identifier the host uses to recognise records owned by this bridge.
pub const MANAGEMENT_PLUGIN: &str = "vso";

/// Capabilities a host exposes to the pipeline.
pub trait UpdateSink {
    /// Receive one reconciled entry, in pipeline order.
    fn submit(&mut self, entry: UpdateEntry);

    /// Resolve a previously reconciled entry by package name.
    ///
    /// Never blocks: while a check is writing the cache this reports
    /// `None` even for a known name, and callers should retry later.
    fn lookup(&self, name: &str) -> Option<UpdateEntry>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Available,
    Unavailable,
    Updatable,
}

impl From<LifecycleState> for AppState {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Available => AppState::Available,
            LifecycleState::Unavailable => AppState::Unavailable,
            LifecycleState::Updatable => AppState::Updatable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quirk {
    NeedsReboot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Package,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Generic,
}

/// Host-native representation of an update entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppRecord {
    pub source: String,
    pub management_plugin: &'static str,
    pub state: AppState,
    pub version: String,
    pub update_version: Option<String>,
    pub quirks: Vec<Quirk>,
    pub scope: Scope,
    pub bundle_kind: BundleKind,
    pub kind: ComponentKind,
    /// Bytes to download; the tool reports none, so this stays at zero.
    pub download_size: u64,
}

impl From<&UpdateEntry> for AppRecord {
    fn from(entry: &UpdateEntry) -> Self {
        let mut quirks = Vec::new();
        if entry.requires_reboot {
            quirks.push(Quirk::NeedsReboot);
        }
        Self {
            source: entry.name.clone(),
            management_plugin: MANAGEMENT_PLUGIN,
            state: entry.state.into(),
            version: entry.displayed_version.clone(),
            update_version: entry.update_version.clone(),
            quirks,
            scope: Scope::System,
            bundle_kind: BundleKind::Package,
            kind: ComponentKind::Generic,
            download_size: 0,
        }
    }
}

impl fmt::Display for AppRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.state, &self.update_version) {
            (AppState::Updatable, Some(next)) => {
                write!(f, "{:<12} {} {} -> {}", "updatable", self.source, self.version, next)
            }
            (AppState::Available, _) => write!(f, "{:<12} {} {}", "new", self.source, self.version),
            (AppState::Unavailable, _) => {
                write!(f, "{:<12} {} {}", "removed", self.source, self.version)
            }
            (AppState::Updatable, None) => {
                write!(f, "{:<12} {} {}", "updatable", self.source, self.version)
            }
        }
    }
}

/// App list accumulated for one host query, backed by the shared cache.
#[derive(Debug, Default)]
pub struct AppList {
    apps: Vec<AppRecord>,
    cache: EntryCache,
}

impl AppList {
    pub fn new(cache: EntryCache) -> Self {
        Self {
            apps: Vec::new(),
            cache,
        }
    }

    pub fn apps(&self) -> &[AppRecord] {
        &self.apps
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// App records for `state`, in submission order.
    pub fn with_state(&self, state: AppState) -> impl Iterator<Item = &AppRecord> {
        self.apps.iter().filter(move |app| app.state == state)
    }
}

impl UpdateSink for AppList {
    fn submit(&mut self, entry: UpdateEntry) {
        self.apps.push(AppRecord::from(&entry));
    }

    fn lookup(&self, name: &str) -> Option<UpdateEntry> {
        self.cache.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::PackageChangeRecord;

    fn entry(name: &str, previous: Option<&str>, new: Option<&str>) -> UpdateEntry {
        UpdateEntry::from_record(&PackageChangeRecord::new(name, previous, new).unwrap())
    }

    #[test]
    fn record_carries_fixed_host_attributes() {
        let app = AppRecord::from(&entry("libfoo", Some("1.0"), Some("2.0")));
        assert_eq!(app.source, "libfoo");
        assert_eq!(app.management_plugin, MANAGEMENT_PLUGIN);
        assert_eq!(app.state, AppState::Updatable);
        assert_eq!(app.version, "1.0");
        assert_eq!(app.update_version.as_deref(), Some("2.0"));
        assert_eq!(app.quirks, vec![Quirk::NeedsReboot]);
        assert_eq!(app.scope, Scope::System);
        assert_eq!(app.bundle_kind, BundleKind::Package);
        assert_eq!(app.kind, ComponentKind::Generic);
        assert_eq!(app.download_size, 0);
    }

    #[test]
    fn display_names_each_state() {
        assert!(AppRecord::from(&entry("a", Some("1"), Some("2")))
            .to_string()
            .ends_with("a 1 -> 2"));
        assert!(AppRecord::from(&entry("b", None, Some("3")))
            .to_string()
            .starts_with("new"));
        assert!(AppRecord::from(&entry("c", Some("4"), None))
            .to_string()
            .starts_with("removed"));
    }

    #[test]
    fn app_list_lookup_reads_shared_cache() {
        let cache = EntryCache::new();
        let mut list = AppList::new(cache.clone());
        let submitted = entry("bash", Some("5.1"), Some("5.2"));
        cache.insert(submitted.clone());
        list.submit(submitted.clone());
        assert_eq!(list.len(), 1);
        assert_eq!(list.lookup("bash"), Some(submitted));
        assert!(list.lookup("zsh").is_none());
        assert_eq!(list.with_state(AppState::Updatable).count(), 1);
        assert_eq!(list.with_state(AppState::Available).count(), 0);
    }
}
