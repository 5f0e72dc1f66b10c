/*============================================================
  Synavera Project: VSO Bridge
  Module: vso_bridge::plugin
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Host-facing entry points: check for updates and apply the
    pending upgrade. Runs the runner, parser and reconciler in
    sequence on a single worker slot. Hosts resolve packages
    through `UpdateSink::lookup` on the shared entry cache.

  Security / Safety Notes:
    The apply path mutates the system image through the
    escalator. It refuses to start while the transaction lock
    exists and never runs concurrently with a check.

  Dependencies:
    tokio::sync::Mutex as the worker slot.

  Operational Scope:
    Owned by the host for its whole lifetime; the entry cache
    lives here and survives across checks.

  Revision History:
    2026-10-16 COD  Authored worker-serialised plugin layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - One run in flight; lookups never wait for it and may
      miss while the reconciler holds the cache
    - Failures propagate to the caller unretried
    - Absence of updates is an empty result, not an error
============================================================*/

use tokio::sync::Mutex;

use crate::config::BridgeConfig;
use crate::diff::{parse_payload, PayloadFormat};
use crate::error::{Result, VsoError};
use crate::host::UpdateSink;
use crate::logger::Logger;
use crate::reconcile::{reconcile, EntryCache, UpdateEntry};
use crate::runner::{display_command, CommandRunner, RawDiffPayload};

/// Result of one check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub has_update: bool,
    pub new_digest: Option<String>,
    pub entries: Vec<UpdateEntry>,
}

pub struct VsoPlugin {
    config: BridgeConfig,
    runner: CommandRunner,
    cache: EntryCache,
    worker: Mutex<()>,
}

impl VsoPlugin {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_cache(config, EntryCache::new())
    }

    pub fn with_cache(config: BridgeConfig, cache: EntryCache) -> Self {
        let runner = CommandRunner::new(config.timeout());
        Self {
            config,
            runner,
            cache,
            worker: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    /// Run the check command and submit every reconciled entry to `sink`.
    pub async fn add_updates<S: UpdateSink>(
        &self,
        sink: &mut S,
        logger: &Logger,
    ) -> Result<CheckOutcome> {
        let _slot = self.worker.lock().await;
        let argv = self.config.check_command();
        logger.info("CHECK", format!("Running `{}`", display_command(&argv)));

        let payload = self.runner.capture(&argv).await.map_err(|err| {
            logger.error("CHECK", format!("Update check failed: {err}"));
            err
        })?;
        logger.debug("CHECK", format!("Captured {} bytes", payload.len()));

        self.ingest_locked(&payload, self.config.command.format, sink, logger)
    }

    /// Parse and reconcile a payload captured elsewhere.
    pub async fn ingest<S: UpdateSink>(
        &self,
        payload: &RawDiffPayload,
        format: PayloadFormat,
        sink: &mut S,
        logger: &Logger,
    ) -> Result<CheckOutcome> {
        let _slot = self.worker.lock().await;
        self.ingest_locked(payload, format, sink, logger)
    }

    fn ingest_locked<S: UpdateSink>(
        &self,
        payload: &RawDiffPayload,
        format: PayloadFormat,
        sink: &mut S,
        logger: &Logger,
    ) -> Result<CheckOutcome> {
        let parsed = parse_payload(payload, format, logger).map_err(|err| {
            logger.error("DIFF", err.to_string());
            err
        })?;
        let entries = reconcile(&parsed.records, &self.cache, logger);
        for entry in &entries {
            sink.submit(entry.clone());
        }
        logger.info(
            "CHECK",
            format!(
                "has_update={} entries={}",
                parsed.has_update,
                entries.len()
            ),
        );
        Ok(CheckOutcome {
            has_update: parsed.has_update,
            new_digest: parsed.new_digest,
            entries,
        })
    }

    /// Past updates are not tracked by the upgrade tool.
    pub fn add_updates_historical(&self) -> Vec<UpdateEntry> {
        Vec::new()
    }

    /// Apply the pending upgrade unless a transaction is already waiting on a reboot.
    pub async fn apply_upgrade(&self, logger: &Logger) -> Result<()> {
        let _slot = self.worker.lock().await;
        let lock_path = self.config.lock_path();
        let locked = lock_path.try_exists().map_err(|err| {
            VsoError::Filesystem(format!(
                "Failed to inspect transaction lock {}: {err}",
                lock_path.display()
            ))
        })?;
        if locked {
            logger.warn(
                "LOCKED",
                format!("Transaction lock present at {}", lock_path.display()),
            );
            return Err(VsoError::Locked {
                path: lock_path.to_path_buf(),
            });
        }

        let argv = self.config.apply_command();
        logger.info("APPLY", format!("Running `{}`", display_command(&argv)));
        self.runner.execute(&argv).await.map_err(|err| {
            logger.error("APPLY", format!("Upgrade failed: {err}"));
            err
        })?;
        logger.info("APPLY", "Upgrade staged; reboot to complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::host::{AppList, AppState};
    use crate::reconcile::LifecycleState;

    fn config_for(tool: &str, check_args: &[&str], apply_args: &[&str], lock: &Path) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.command.escalator = String::new();
        config.command.tool = tool.into();
        config.command.check_args = check_args.iter().map(|s| s.to_string()).collect();
        config.command.apply_args = apply_args.iter().map(|s| s.to_string()).collect();
        config.paths.lock_path = lock.to_path_buf();
        config
    }

    fn payload_file(dir: &Path, body: &str) -> String {
        let path = dir.join("payload.txt");
        std::fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    const MESA_UPDATE: &str = "Checking...\n{\"hasUpdate\":true,\"newDigest\":\"sha256:1\",\"systemPackageDiff\":{\"upgraded\":[{\"name\":\"mesa\",\"previous_version\":\"23.1\",\"new_version\":\"23.2\"}],\"removed\":[{\"name\":\"xterm\",\"previous_version\":\"390\"}]},\"overlayPackageDiff\":{\"added\":[{\"name\":\"htop\",\"new_version\":\"3.3\"}]}}\n\n";

    #[tokio::test]
    async fn check_submits_entries_and_fills_cache() {
        let dir = tempfile::tempdir().unwrap();
        let payload = payload_file(dir.path(), MESA_UPDATE);
        let plugin = VsoPlugin::new(config_for("cat", &[payload.as_str()], &[], &dir.path().join("lock")));
        let mut list = AppList::new(plugin.cache().clone());

        let outcome = plugin.add_updates(&mut list, &Logger::silent()).await.unwrap();
        assert!(outcome.has_update);
        assert_eq!(outcome.new_digest.as_deref(), Some("sha256:1"));
        let names: Vec<&str> = list.apps().iter().map(|a| a.source.as_str()).collect();
        assert_eq!(names, vec!["mesa", "xterm", "htop"]);
        assert_eq!(list.with_state(AppState::Unavailable).count(), 1);
        assert_eq!(
            plugin.cache().lookup("htop").unwrap().state,
            LifecycleState::Available
        );
        assert_eq!(list.lookup("mesa").unwrap().displayed_version, "23.1");
    }

    #[tokio::test]
    async fn no_update_is_an_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = VsoPlugin::new(config_for(
            "sh",
            &["-c", "printf '{\"hasUpdate\":false,\"newDigest\":\"\"}\\n'"],
            &[],
            &dir.path().join("lock"),
        ));
        let mut list = AppList::default();
        let outcome = plugin.add_updates(&mut list, &Logger::silent()).await.unwrap();
        assert_eq!(outcome, CheckOutcome::default());
        assert!(list.is_empty());
        assert!(plugin.cache().is_empty());
    }

    #[tokio::test]
    async fn silent_failing_check_means_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = VsoPlugin::new(config_for("sh", &["-c", "exit 4"], &[], &dir.path().join("lock")));
        let mut list = AppList::default();
        let outcome = plugin.add_updates(&mut list, &Logger::silent()).await.unwrap();
        assert!(outcome.entries.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = VsoPlugin::new(config_for("sh", &["-c", "echo '{not json'"], &[], &dir.path().join("lock")));
        let mut list = AppList::default();
        let err = plugin.add_updates(&mut list, &Logger::silent()).await.unwrap_err();
        assert!(matches!(err, VsoError::Parse(_)));
        assert!(list.is_empty());
        assert!(plugin.cache().is_empty());
    }

    #[tokio::test]
    async fn recheck_with_new_version_updates_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = VsoPlugin::new(config_for("cat", &[], &[], &dir.path().join("lock")));
        let logger = Logger::silent();
        let first = RawDiffPayload::new("  - mesa\t23.1 -> 23.2\n");
        let second = RawDiffPayload::new("  - mesa\t23.1 -> 23.3\n");

        plugin
            .ingest(&first, PayloadFormat::Legacy, &mut AppList::default(), &logger)
            .await
            .unwrap();
        plugin
            .ingest(&second, PayloadFormat::Legacy, &mut AppList::default(), &logger)
            .await
            .unwrap();
        assert_eq!(
            plugin.cache().lookup("mesa").unwrap().update_version.as_deref(),
            Some("23.3")
        );
    }

    #[tokio::test]
    async fn apply_refuses_while_locked_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("abroot-transactions.lock");
        std::fs::write(&lock, "").unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());
        let plugin = VsoPlugin::new(config_for("sh", &[], &["-c", script.as_str()], &lock));

        let err = plugin.apply_upgrade(&Logger::silent()).await.unwrap_err();
        assert!(matches!(err, VsoError::Locked { .. }));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn apply_failure_is_an_execution_error_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = VsoPlugin::new(config_for("sh", &[], &["-c", "exit 1"], &dir.path().join("lock")));
        let err = plugin.apply_upgrade(&Logger::silent()).await.unwrap_err();
        assert!(matches!(err, VsoError::CommandFailure { status: 1, .. }));
        assert!(err.is_execution());
        assert!(plugin.cache().is_empty());
    }

    #[tokio::test]
    async fn apply_runs_command_when_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());
        let plugin = VsoPlugin::new(config_for("sh", &[], &["-c", script.as_str()], &dir.path().join("lock")));
        plugin.apply_upgrade(&Logger::silent()).await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn concurrent_checks_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let payload = payload_file(dir.path(), MESA_UPDATE);
        let trace = dir.path().join("trace");
        let script = format!(
            "echo start >> {trace}; sleep 0.2; echo end >> {trace}; cat {payload}",
            trace = trace.display()
        );
        let plugin = VsoPlugin::new(config_for("sh", &["-c", script.as_str()], &[], &dir.path().join("lock")));
        let logger = Logger::silent();
        let mut left = AppList::default();
        let mut right = AppList::default();
        let (a, b) = tokio::join!(
            plugin.add_updates(&mut left, &logger),
            plugin.add_updates(&mut right, &logger)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 3);
        assert_eq!(plugin.cache().len(), 3);

        let trace = std::fs::read_to_string(&trace).unwrap();
        let marks: Vec<&str> = trace.lines().collect();
        assert_eq!(marks, vec!["start", "end", "start", "end"]);
    }

    #[test]
    fn historical_updates_are_empty() {
        let plugin = VsoPlugin::new(BridgeConfig::default());
        assert!(plugin.add_updates_historical().is_empty());
    }
}
