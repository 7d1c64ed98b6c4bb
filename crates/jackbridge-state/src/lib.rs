//! JackBridge State - Snapshot persistence and restore.
//!
//! The state file is a single JSON document holding the live graph and the
//! tracked set at save time. It is replaced atomically on every save, so a
//! crash mid-write leaves the previous snapshot intact.

pub mod error;

pub use error::{StateError, StateResult};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use jackbridge_core::StateSnapshot;
use jackbridge_jack::{BatchResult, ReconciliationEngine, RouterControl};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Bounds for waiting on the router before a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePolicy {
    /// Liveness checks before giving up
    pub attempts: u32,
    /// Pause between checks
    pub interval: Duration,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self { attempts: 60, interval: Duration::from_secs(1) }
    }
}

/// What a restore did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Liveness checks used
    pub attempts: u32,
    /// Tracked entries in the snapshot
    pub entries: usize,
    /// Reconnections issued for entries not already live
    pub batch: BatchResult,
}

/// Durable store for the connection snapshot.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at the default location in the user's data directory.
    ///
    /// # Errors
    /// Returns an error if no data directory can be determined.
    pub fn open() -> StateResult<Self> {
        Ok(Self::at(Self::default_path()?))
    }

    /// Store at a specific path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the default state file path.
    ///
    /// # Errors
    /// Returns an error if no data directory can be determined.
    pub fn default_path() -> StateResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "jackbridge", "JackBridge").ok_or(StateError::NoDataDir)?;
        Ok(dirs.data_dir().join("state.json"))
    }

    /// The state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capture the engine's current status and persist it.
    ///
    /// # Errors
    /// Engine errors reading the live graph, or `PersistenceFailed`.
    pub async fn save<R: RouterControl>(
        &self,
        engine: &ReconciliationEngine<R>,
    ) -> StateResult<StateSnapshot> {
        let status = engine.status().await?;
        let snapshot = StateSnapshot::capture(status);
        self.write(&snapshot).await?;
        Ok(snapshot)
    }

    /// Persist a snapshot, replacing the previous one atomically.
    ///
    /// # Errors
    /// Returns `PersistenceFailed` on any I/O failure; the previous snapshot
    /// is left untouched.
    pub async fn write(&self, snapshot: &StateSnapshot) -> StateResult<()> {
        let persistence_failed =
            |source: io::Error| StateError::PersistenceFailed { path: self.path.clone(), source };

        let mut bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| persistence_failed(io::Error::other(e)))?;
        bytes.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(io::Error::other)
            .and_then(|written| written)
            .map_err(persistence_failed)?;

        info!(
            path = %self.path.display(),
            connections = snapshot.connections.len(),
            tracked = snapshot.tracked.len(),
            "State saved"
        );
        Ok(())
    }

    /// Load the last snapshot.
    ///
    /// # Errors
    /// `NotFound` if nothing was saved yet, `Read` or `Corrupt` otherwise.
    pub async fn load(&self) -> StateResult<StateSnapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(self.path.clone()));
            }
            Err(source) => return Err(StateError::Read { path: self.path.clone(), source }),
        };

        let snapshot: StateSnapshot = serde_json::from_slice(&bytes)
            .map_err(|source| StateError::Corrupt { path: self.path.clone(), source })?;
        debug!(path = %self.path.display(), timestamp = %snapshot.timestamp, "State loaded");
        Ok(snapshot)
    }

    /// Wait for the router, then replay the saved tracked connections.
    ///
    /// The snapshot is loaded before any waiting. If the router never
    /// answers within the policy bound, nothing is changed.
    ///
    /// # Errors
    /// `NotFound`/`Read`/`Corrupt` from loading, `RestoreTimeout`, or engine
    /// errors from the replay.
    pub async fn restore<R: RouterControl>(
        &self,
        engine: &ReconciliationEngine<R>,
        policy: RestorePolicy,
    ) -> StateResult<RestoreOutcome> {
        let snapshot = self.load().await?;
        let max_attempts = policy.attempts.max(1);

        let mut attempts = 0;
        loop {
            attempts += 1;
            if engine.is_router_alive().await {
                break;
            }
            if attempts >= max_attempts {
                warn!(attempts, "Router unreachable, restore abandoned");
                return Err(StateError::RestoreTimeout { attempts });
            }
            debug!(attempts, "Router not reachable yet");
            tokio::time::sleep(policy.interval).await;
        }

        let batch = engine.replay(&snapshot.tracked).await?;
        info!(
            attempts,
            entries = snapshot.tracked.len(),
            reconnected = batch.succeeded,
            failed = batch.failed,
            "State restored"
        );
        Ok(RestoreOutcome { attempts, entries: snapshot.tracked.len(), batch })
    }
}

/// Write to a temp file beside `path`, sync it, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    let written = fs::File::create(&temp_path).and_then(|mut temp| {
        temp.write_all(bytes)?;
        temp.sync_all()
    });

    if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use jackbridge_core::{Connection, DeviceMap, EstablishedBy, GraphStatus, TrackedConnection};
    use jackbridge_jack::{ExecutionResult, RouterCommand, TransportResult};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeRouter {
        alive: AtomicBool,
        probes: AtomicUsize,
        edges: Mutex<BTreeSet<Connection>>,
        writes: AtomicUsize,
    }

    impl RouterControl for FakeRouter {
        async fn execute(&self, command: &RouterCommand) -> TransportResult<ExecutionResult> {
            let ok = |stdout: String| ExecutionResult::from_exit(0, stdout, String::new(), Duration::ZERO);
            Ok(match command {
                RouterCommand::Probe => {
                    self.probes.fetch_add(1, Ordering::SeqCst);
                    if self.alive.load(Ordering::SeqCst) {
                        ok("running".into())
                    } else {
                        ExecutionResult::delivery_failed("connection refused", Duration::ZERO)
                    }
                }
                RouterCommand::ListConnections => {
                    let text = self
                        .edges
                        .lock()
                        .iter()
                        .map(|c| format!("{}\n   {}\n", c.from, c.to))
                        .collect::<String>();
                    ok(text)
                }
                RouterCommand::ListPorts => ok(String::new()),
                RouterCommand::Connect { from, to } => {
                    self.writes.fetch_add(1, Ordering::SeqCst);
                    self.edges.lock().insert(Connection::new(from.as_str(), to.as_str()));
                    ok(String::new())
                }
                RouterCommand::Disconnect { .. } => {
                    self.writes.fetch_add(1, Ordering::SeqCst);
                    ok(String::new())
                }
            })
        }
    }

    fn engine(alive: bool) -> ReconciliationEngine<FakeRouter> {
        let router = FakeRouter { alive: AtomicBool::new(alive), ..FakeRouter::default() };
        ReconciliationEngine::new(Arc::new(router), DeviceMap::default(), Vec::new())
    }

    fn snapshot() -> StateSnapshot {
        let conn = Connection::new("system:capture_1", "system:playback_1");
        StateSnapshot::capture(GraphStatus {
            live: vec![conn.clone()],
            tracked: vec![TrackedConnection::now(conn, EstablishedBy::Preset("stereo".into()))],
        })
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("nested").join("state.json"));

        let saved = snapshot();
        store.write(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), saved);

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("state.json"));
        assert_matches!(store.load().await, Err(StateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"connections\": [").unwrap();
        assert_matches!(StateStore::at(path).load().await, Err(StateError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::at(&path);
        let saved = snapshot();
        store.write(&saved).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        fs::create_dir(path.with_extension(format!("tmp.{}", std::process::id()))).unwrap();
        let result = store.write(&StateSnapshot::capture(GraphStatus::default())).await;

        assert_matches!(result, Err(StateError::PersistenceFailed { .. }));
        assert_eq!(store.load().await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_save_captures_engine_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("state.json"));
        let engine = engine(true);
        engine.router().edges.lock().insert(Connection::new("system:capture_1", "system:playback_1"));

        let saved = store.save(&engine).await.unwrap();
        assert_eq!(saved.connections.len(), 1);
        assert!(saved.tracked.is_empty());
    }

    #[tokio::test]
    async fn test_restore_replays_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("state.json"));
        store.write(&snapshot()).await.unwrap();
        let engine = engine(true);

        let outcome = store.restore(&engine, RestorePolicy::default()).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.entries, 1);
        assert_eq!(outcome.batch.succeeded, 1);
        assert_eq!(engine.tracked()[0].established_by, EstablishedBy::Preset("stereo".into()));
    }

    #[tokio::test]
    async fn test_restore_gives_up_without_touching_router() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("state.json"));
        store.write(&snapshot()).await.unwrap();
        let engine = engine(false);

        let policy = RestorePolicy { attempts: 3, interval: Duration::from_millis(5) };
        let result = store.restore(&engine, policy).await;

        assert_matches!(result, Err(StateError::RestoreTimeout { attempts: 3 }));
        assert_eq!(engine.router().probes.load(Ordering::SeqCst), 3);
        assert_eq!(engine.router().writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_does_not_wait() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::at(dir.path().join("state.json"));
        let engine = engine(false);

        assert_matches!(
            store.restore(&engine, RestorePolicy::default()).await,
            Err(StateError::NotFound(_))
        );
        assert_eq!(engine.router().probes.load(Ordering::SeqCst), 0);
    }
}
