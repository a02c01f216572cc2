//! Live unlock detection for a running game
//!
//! A game armed for watching gets one session at a time. The session
//! polls an out-of-band feed written by the game process (by default a
//! JSON sidecar file), debounces reads because the producer is not
//! synchronized with us, and deduplicates records by their identity
//! value so each unique unlock is emitted at most once per session.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Only records with this event type are actionable.
pub const EVENT_UNLOCKED: &str = "unlocked";

/// One record in the side-channel feed.
///
/// `timestamp` doubles as the dedup identity: it is monotonic and
/// unique within a session, so a re-read of a rewritten file never
/// yields the same identity twice.
#[derive(Debug, Clone, Deserialize)]
pub struct UnlockRecord {
    pub achievement_id: String,
    #[serde(default)]
    pub achievement_name: String,
    pub event_type: String,
    pub timestamp: i64,
}

/// Source of unlock records for a running target. Implementations are
/// interchangeable transports: sidecar file, IPC pipe, SDK callback
/// bridge.
pub trait UnlockFeed: Send {
    /// Whether new data may have appeared since the last call. A
    /// cheap check; reading happens separately after the debounce.
    fn changed(&mut self) -> bool;

    /// Read every currently visible record. Transient failures are
    /// errors; the session treats them as "nothing this tick" and
    /// retries on the next trigger.
    fn read_records(&mut self) -> Result<Vec<UnlockRecord>>;
}

/// JSON sidecar file transport. Change detection is by mtime and size,
/// polled rather than event-driven, which keeps the retry behavior
/// trivial: a failed read is picked up again next tick.
pub struct SidecarFile {
    path: PathBuf,
    last_seen: Option<(Option<SystemTime>, u64)>,
}

impl SidecarFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: None,
        }
    }
}

impl UnlockFeed for SidecarFile {
    fn changed(&mut self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            // Missing file is not a change; the game may not have
            // written anything yet.
            return false;
        };
        let stamp = (meta.modified().ok(), meta.len());
        if self.last_seen.as_ref() == Some(&stamp) {
            return false;
        }
        self.last_seen = Some(stamp);
        true
    }

    fn read_records(&mut self) -> Result<Vec<UnlockRecord>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw).context("Malformed unlock record list")
    }
}

/// Per-session dedup state. Owned by exactly one armed session and
/// fully reset on every start.
#[derive(Debug, Default)]
pub struct WatchSession {
    seen: HashSet<i64>,
}

impl WatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a batch down to newly actionable unlocks, in file order.
    /// Identities are marked seen before the result is returned, so
    /// overlapping re-reads of rewritten content cannot emit twice.
    pub fn ingest(&mut self, records: &[UnlockRecord]) -> Vec<String> {
        records
            .iter()
            .filter(|r| r.event_type == EVENT_UNLOCKED && self.seen.insert(r.timestamp))
            .map(|r| r.achievement_id.clone())
            .collect()
    }
}

/// State machine over one running-game session at a time: idle until
/// `start`, armed until `stop` or the next `start`.
pub struct UnlockWatcher {
    handle: Option<JoinHandle<()>>,
    debounce: Duration,
    poll_interval: Duration,
}

impl Default for UnlockWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UnlockWatcher {
    pub fn new() -> Self {
        Self {
            handle: None,
            // The producer may still be mid-write when the change is
            // observed; wait it out before opening the file.
            debounce: Duration::from_millis(300),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Timing override for short test runs.
    pub fn with_timing(debounce: Duration, poll_interval: Duration) -> Self {
        Self {
            handle: None,
            debounce,
            poll_interval,
        }
    }

    /// Arm a fresh session for the given target. Any current session
    /// is torn down first, dedup state included; a session is never
    /// silently extended to a different target.
    ///
    /// Fails with guidance when the target has no usable executable,
    /// because an inert watch would otherwise go unnoticed.
    pub fn start(
        &mut self,
        executable_path: &Path,
        feed: impl UnlockFeed + 'static,
        events: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        if executable_path.as_os_str().is_empty() || !executable_path.exists() {
            bail!(
                "game executable not found at '{}'; set one with `trophycase game set-exe` \
                 before watching",
                executable_path.display()
            );
        }

        self.stop();
        let (debounce, poll) = (self.debounce, self.poll_interval);
        self.handle = Some(tokio::spawn(run_session(feed, events, debounce, poll)));
        Ok(())
    }

    /// Disarm, releasing the watch task and its dedup set.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for UnlockWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_session(
    mut feed: impl UnlockFeed,
    events: mpsc::UnboundedSender<String>,
    debounce: Duration,
    poll: Duration,
) {
    let mut session = WatchSession::new();
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !feed.changed() {
            continue;
        }

        tokio::time::sleep(debounce).await;
        match feed.read_records() {
            Ok(records) => {
                for achievement_id in session.ingest(&records) {
                    tracing::info!("Unlock detected: {achievement_id}");
                    if events.send(achievement_id).is_err() {
                        // Consumer went away; nothing left to do.
                        return;
                    }
                }
            }
            Err(e) => {
                // Locked, missing or half-written file: stay armed and
                // retry on the next trigger.
                tracing::debug!("Unlock feed read failed, will retry: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn unlocked(id: &str, timestamp: i64) -> UnlockRecord {
        UnlockRecord {
            achievement_id: id.to_string(),
            achievement_name: String::new(),
            event_type: EVENT_UNLOCKED.to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_ingest_emits_in_file_order() {
        let mut session = WatchSession::new();
        let out = session.ingest(&[
            unlocked("ACH_B", 2),
            unlocked("ACH_A", 1),
            unlocked("ACH_C", 3),
        ]);
        assert_eq!(out, vec!["ACH_B", "ACH_A", "ACH_C"]);
    }

    /// P6 / Scenario C: the same identity delivered across overlapping
    /// re-reads fires exactly once.
    #[test]
    fn test_ingest_never_repeats_an_identity() {
        let mut session = WatchSession::new();
        let first = session.ingest(&[unlocked("ACH_A", 1), unlocked("ACH_B", 2)]);
        assert_eq!(first, vec!["ACH_A", "ACH_B"]);

        // The file was rewritten with overlapping content.
        let second = session.ingest(&[
            unlocked("ACH_A", 1),
            unlocked("ACH_B", 2),
            unlocked("ACH_C", 3),
        ]);
        assert_eq!(second, vec!["ACH_C"]);

        let third = session.ingest(&[unlocked("ACH_C", 3)]);
        assert!(third.is_empty());
    }

    /// Timestamp identity deliberately lets a relock-then-re-unlock
    /// replay: the second unlock carries a fresh identity.
    #[test]
    fn test_re_unlock_with_new_identity_replays() {
        let mut session = WatchSession::new();
        assert_eq!(session.ingest(&[unlocked("ACH_A", 1)]).len(), 1);
        assert_eq!(session.ingest(&[unlocked("ACH_A", 50)]), vec!["ACH_A"]);
    }

    #[test]
    fn test_non_unlock_events_ignored() {
        let mut session = WatchSession::new();
        let mut progress = unlocked("ACH_A", 1);
        progress.event_type = "progress".to_string();
        assert!(session.ingest(&[progress]).is_empty());
        // The identity was not burned by the ignored record.
        assert_eq!(session.ingest(&[unlocked("ACH_A", 1)]).len(), 1);
    }

    #[test]
    fn test_sidecar_parses_record_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("achievements.json");
        fs::write(
            &path,
            r#"[
                {"achievement_id": "ACH_WIN", "achievement_name": "Winner",
                 "event_type": "unlocked", "timestamp": 1700000000},
                {"achievement_id": "ACH_RUN", "achievement_name": "Runner",
                 "event_type": "progress", "timestamp": 1700000001}
            ]"#,
        )
        .unwrap();

        let mut feed = SidecarFile::new(&path);
        assert!(feed.changed());
        let records = feed.read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].achievement_id, "ACH_WIN");

        // Unchanged file does not re-trigger.
        assert!(!feed.changed());
    }

    #[test]
    fn test_sidecar_missing_file_is_not_a_change() {
        let dir = TempDir::new().unwrap();
        let mut feed = SidecarFile::new(dir.path().join("absent.json"));
        assert!(!feed.changed());
        assert!(feed.read_records().is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_missing_executable() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = UnlockWatcher::new();
        let err = watcher
            .start(Path::new("/nonexistent/game.exe"), SidecarFile::new("x"), tx)
            .unwrap_err();
        assert!(err.to_string().contains("set-exe"), "guides the user: {err}");
        assert!(!watcher.is_armed());
    }

    #[tokio::test]
    async fn test_armed_session_emits_each_unlock_once() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("game.exe");
        fs::write(&exe, b"").unwrap();
        let sidecar = dir.path().join("achievements.json");
        fs::write(
            &sidecar,
            r#"[{"achievement_id": "ACH_A", "achievement_name": "A",
                 "event_type": "unlocked", "timestamp": 1}]"#,
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher =
            UnlockWatcher::with_timing(Duration::from_millis(5), Duration::from_millis(10));
        watcher.start(&exe, SidecarFile::new(&sidecar), tx).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("unlock within timeout")
            .expect("channel open");
        assert_eq!(first, "ACH_A");

        // Rewrite with overlapping content plus one new record; only
        // the new identity comes through.
        fs::write(
            &sidecar,
            r#"[{"achievement_id": "ACH_A", "achievement_name": "A",
                 "event_type": "unlocked", "timestamp": 1},
                {"achievement_id": "ACH_B", "achievement_name": "B",
                 "event_type": "unlocked", "timestamp": 2}]"#,
        )
        .unwrap();

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("unlock within timeout")
            .expect("channel open");
        assert_eq!(second, "ACH_B");

        watcher.stop();
        assert!(rx.try_recv().is_err());
    }
}
