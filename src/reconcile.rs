/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::reconcile
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Translate package change records into update entries with
    an inferred lifecycle state, and index them by package name
    in a cache that outlives a single check.

  Security / Safety Notes:
    Pure in-memory transformation; no I/O beyond logging.

  Dependencies:
    serde for report serialisation.

  Operational Scope:
    Runs after the diff parser on every check; the cache is read
    by lookups from other contexts.

  Revision History:
    2026-10-16 COD  Derived from the manifest resolver.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Output order mirrors input order
    - Last write wins in the cache index
    - Lookups never wait on a running reconciliation
============================================================*/

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, TryLockError};

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeCategory, DiffOrigin, PackageChangeRecord, VersionChange};
use crate::logger::Logger;

/// Lifecycle state an entry is presented with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Package arrives with the update.
    Available,
    /// Package disappears with the update.
    Unavailable,
    /// Package changes version with the update.
    Updatable,
}

/// Canonical update unit handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub name: String,
    pub displayed_version: String,
    pub update_version: Option<String>,
    pub state: LifecycleState,
    pub requires_reboot: bool,
    pub size_known: bool,
    pub origin: DiffOrigin,
    pub category: ChangeCategory,
}

impl UpdateEntry {
    pub fn from_record(record: &PackageChangeRecord) -> Self {
        let (displayed_version, update_version, state) = match record.change() {
            VersionChange::Modified { previous, new } => (
                previous.clone(),
                Some(new.clone()),
                LifecycleState::Updatable,
            ),
            VersionChange::Added { new } => (new.clone(), None, LifecycleState::Available),
            VersionChange::Removed { previous } => {
                (previous.clone(), None, LifecycleState::Unavailable)
            }
        };
        Self {
            name: record.name().to_string(),
            displayed_version,
            update_version,
            state,
            // Image-level changes only take effect after a reboot.
            requires_reboot: true,
            size_known: false,
            origin: record.origin(),
            category: record.category(),
        }
    }
}

/// Name-keyed index of the last entry produced for each package.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct EntryCache {
    entries: Arc<RwLock<HashMap<String, UpdateEntry>>>,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the entry previously held for the name.
    pub fn insert(&self, entry: UpdateEntry) -> Option<UpdateEntry> {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(entry.name.clone(), entry)
    }

    /// Non-blocking lookup. `None` covers both unknown names and a cache
    /// momentarily held by a writer.
    pub fn lookup(&self, name: &str) -> Option<UpdateEntry> {
        let guard = match self.entries.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        guard.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build entries for `records` in order, indexing each one in `cache`.
///
/// Repeated names all appear in the output; the cache keeps the last one.
pub fn reconcile(
    records: &[PackageChangeRecord],
    cache: &EntryCache,
    logger: &Logger,
) -> Vec<UpdateEntry> {
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let entry = UpdateEntry::from_record(record);
        if let Some(previous) = cache.insert(entry.clone()) {
            if previous != entry {
                logger.debug(
                    "CACHE",
                    format!(
                        "{} replaced ({:?} {} -> {:?} {})",
                        entry.name,
                        previous.state,
                        previous.displayed_version,
                        entry.state,
                        entry.displayed_version
                    ),
                );
            }
        }
        entries.push(entry);
    }
    logger.info(
        "RECONCILE",
        format!(
            "entries={} cached={}",
            entries.len(),
            cache.len()
        ),
    );
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, previous: Option<&str>, new: Option<&str>) -> PackageChangeRecord {
        PackageChangeRecord::new(name, previous, new).unwrap()
    }

    #[test]
    fn both_versions_make_an_updatable_entry() {
        let entry = UpdateEntry::from_record(&record("libfoo", Some("1.0"), Some("2.0")));
        assert_eq!(entry.state, LifecycleState::Updatable);
        assert_eq!(entry.displayed_version, "1.0");
        assert_eq!(entry.update_version.as_deref(), Some("2.0"));
        assert!(entry.requires_reboot);
        assert!(!entry.size_known);
    }

    #[test]
    fn new_version_only_is_available() {
        let entry = UpdateEntry::from_record(&record("newpkg", None, Some("3.1")));
        assert_eq!(entry.state, LifecycleState::Available);
        assert_eq!(entry.displayed_version, "3.1");
        assert!(entry.update_version.is_none());
    }

    #[test]
    fn previous_version_only_is_unavailable() {
        let entry = UpdateEntry::from_record(&record("oldpkg", Some("0.9"), None));
        assert_eq!(entry.state, LifecycleState::Unavailable);
        assert_eq!(entry.displayed_version, "0.9");
        assert!(entry.update_version.is_none());
    }

    #[test]
    fn output_keeps_input_order_and_duplicates() {
        let cache = EntryCache::new();
        let records = vec![
            record("zlib", Some("1"), Some("2")),
            record("bash", None, Some("5")),
            record("zlib", Some("2"), Some("3")),
        ];
        let entries = reconcile(&records, &cache, &Logger::silent());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zlib", "bash", "zlib"]);
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.lookup("zlib").unwrap().update_version.as_deref(),
            Some("3")
        );
    }

    #[test]
    fn rerun_with_changed_version_updates_cache() {
        let cache = EntryCache::new();
        let logger = Logger::silent();
        reconcile(&[record("mesa", Some("23.1"), Some("23.2"))], &cache, &logger);
        reconcile(&[record("mesa", Some("23.1"), Some("23.3"))], &cache, &logger);
        let cached = cache.lookup("mesa").unwrap();
        assert_eq!(cached.update_version.as_deref(), Some("23.3"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookup_of_unknown_name_is_none() {
        let cache = EntryCache::new();
        assert!(cache.lookup("missing").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_misses_while_a_writer_holds_the_cache() {
        let cache = EntryCache::new();
        reconcile(&[record("mesa", Some("23.1"), Some("23.2"))], &cache, &Logger::silent());
        {
            let _writer = cache.entries.write().unwrap();
            assert!(cache.lookup("mesa").is_none());
        }
        assert!(cache.lookup("mesa").is_some());
    }

    #[test]
    fn clones_share_the_index_across_threads() {
        let cache = EntryCache::new();
        let reader = cache.clone();
        reconcile(&[record("kernel", Some("6.1"), Some("6.6"))], &cache, &Logger::silent());
        let seen = std::thread::spawn(move || reader.lookup("kernel"))
            .join()
            .unwrap();
        assert_eq!(seen.unwrap().state, LifecycleState::Updatable);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let cache = EntryCache::new();
        assert!(reconcile(&[], &cache, &Logger::silent()).is_empty());
    }
}
