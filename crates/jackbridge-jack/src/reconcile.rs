//! Reconciliation of the live graph toward a desired connection set.
//!
//! The engine only ever removes connections it tracks as its own. Anything
//! made by other tools survives preset changes and is only touched by an
//! explicit [`ReconciliationEngine::clear_all`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use jackbridge_core::{
    Connection, DesiredConnectionSet, DeviceMap, Error as CoreError, EstablishedBy, GraphStatus,
    Port, Preset, PresetSummary, TrackedConnection,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::RouterCommand;
use crate::error::{EngineError, EngineResult};
use crate::gate::UpdateGate;
use crate::graph::{LiveGraph, TrackedSet};
use crate::lsp::{parse_connections, parse_ports};
use crate::result::{BatchOpKind, BatchOperation, BatchResult, ExecutionResult};
use crate::transport::{RouterControl, probe_succeeded};

/// Operations needed to move the live graph to a desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Tracked live connections no longer desired
    pub to_remove: Vec<Connection>,
    /// Desired connections missing from the live graph
    pub to_add: Vec<Connection>,
}

impl ReconcilePlan {
    /// Batch operations: every disconnect, then every connect.
    #[must_use]
    pub fn operations(&self) -> Vec<BatchOperation> {
        let removals = self.to_remove.iter().map(|c| BatchOperation::disconnect(&c.from, &c.to));
        let additions = self.to_add.iter().map(|c| BatchOperation::connect(&c.from, &c.to));
        removals.chain(additions).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.to_remove.len() + self.to_add.len()
    }
}

/// Compute `to_add = desired - live` and `to_remove = live ∩ (tracked - desired)`.
///
/// Edges match in either orientation. `tracked` is expected in the live
/// graph's orientation.
#[must_use]
pub fn plan(
    desired: &DesiredConnectionSet,
    live: &LiveGraph,
    tracked: &BTreeSet<Connection>,
) -> ReconcilePlan {
    let to_remove = live
        .iter()
        .filter(|c| tracked.contains(*c) && !desired.contains(c) && !desired.contains(&c.reversed()))
        .cloned()
        .collect();

    let mut to_add: Vec<Connection> = Vec::new();
    for connection in desired.iter() {
        if !live.has_edge(connection) && !to_add.contains(&connection.reversed()) {
            to_add.push(connection.clone());
        }
    }
    ReconcilePlan { to_remove, to_add }
}

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Connect,
    Disconnect,
}

/// Result of a toggle request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    pub connection: Connection,
    pub result: ExecutionResult,
}

/// Result of a clear-all request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearOutcome {
    /// Connections actually removed
    pub cleared: usize,
    pub batch: BatchResult,
}

/// Converges the router's live graph toward desired connection sets.
pub struct ReconciliationEngine<R> {
    router: Arc<R>,
    devices: DeviceMap,
    presets: BTreeMap<String, Preset>,
    tracked: TrackedSet,
    gate: UpdateGate,
}

impl<R: RouterControl> ReconciliationEngine<R> {
    /// Create an engine with an empty tracked set.
    #[must_use]
    pub fn new(router: Arc<R>, devices: DeviceMap, presets: impl IntoIterator<Item = Preset>) -> Self {
        Self {
            router,
            devices,
            presets: presets.into_iter().map(|p| (p.name.clone(), p)).collect(),
            tracked: TrackedSet::new(),
            gate: UpdateGate::new(),
        }
    }

    /// The router this engine drives.
    #[must_use]
    pub fn router(&self) -> &Arc<R> {
        &self.router
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    /// Tracked connections with their metadata.
    #[must_use]
    pub fn tracked(&self) -> Vec<TrackedConnection> {
        self.tracked.snapshot()
    }

    /// Whether a mutation is in flight.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.gate.is_held()
    }

    /// Summaries of the configured presets, sorted by name.
    #[must_use]
    pub fn list_presets(&self) -> Vec<PresetSummary> {
        self.presets.values().map(PresetSummary::from).collect()
    }

    #[must_use]
    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    async fn query(&self, command: RouterCommand) -> EngineResult<String> {
        let result = self.router.execute(&command).await?;
        if result.success {
            Ok(result.stdout)
        } else {
            Err(EngineError::QueryFailed(format!("{command}: {}", result.error_message())))
        }
    }

    /// Fetch and normalise the live graph.
    ///
    /// # Errors
    /// Fails if the connection listing cannot be obtained. A failed port
    /// listing only degrades direction detection to the naming convention.
    pub async fn live_graph(&self) -> EngineResult<LiveGraph> {
        let listing = self.query(RouterCommand::ListConnections).await?;
        let parsed = parse_connections(&listing);
        if parsed.skipped > 0 {
            warn!(skipped = parsed.skipped, "Skipped malformed lines in connection listing");
        }

        let ports = match self.query(RouterCommand::ListPorts).await {
            Ok(text) => parse_ports(&text),
            Err(e) => {
                debug!(error = %e, "Port listing unavailable, using naming convention");
                Vec::new()
            }
        };

        Ok(LiveGraph::normalize(&parsed.connections, &ports))
    }

    /// Live graph plus tracked set.
    ///
    /// # Errors
    /// Fails if the live graph cannot be read.
    pub async fn status(&self) -> EngineResult<GraphStatus> {
        let live = self.live_graph().await?;
        self.tracked.realign(&live);
        Ok(GraphStatus { live: live.to_vec(), tracked: self.tracked.snapshot() })
    }

    /// Every port the router exposes, with its effective direction.
    ///
    /// # Errors
    /// Fails if the port listing cannot be obtained.
    pub async fn list_ports(&self) -> EngineResult<Vec<Port>> {
        let text = self.query(RouterCommand::ListPorts).await?;
        Ok(parse_ports(&text)
            .into_iter()
            .map(|mut port| {
                port.direction = port.effective_direction();
                port
            })
            .collect())
    }

    /// Whether the router answers a liveness probe.
    pub async fn is_router_alive(&self) -> bool {
        matches!(self.router.execute(&RouterCommand::Probe).await, Ok(r) if probe_succeeded(&r))
    }

    /// Apply a named preset.
    ///
    /// # Errors
    /// `PresetNotFound`, `AliasResolutionFailed` (nothing is issued),
    /// `ConcurrentUpdateRejected`, or a failed live-graph query.
    pub async fn apply_preset(&self, name: &str) -> EngineResult<BatchResult> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| CoreError::PresetNotFound(name.to_string()))?;
        let desired = preset.resolve(&self.devices)?;

        let _guard = self.gate.try_acquire()?;
        info!(preset = name, connections = desired.len(), "Applying preset");
        self.reconcile(&desired, &EstablishedBy::Preset(name.to_string())).await
    }

    /// Reconcile toward an ad-hoc desired set.
    ///
    /// # Errors
    /// `ConcurrentUpdateRejected` or a failed live-graph query.
    pub async fn apply_desired(
        &self,
        desired: &DesiredConnectionSet,
        established_by: EstablishedBy,
    ) -> EngineResult<BatchResult> {
        let _guard = self.gate.try_acquire()?;
        self.reconcile(desired, &established_by).await
    }

    async fn reconcile(
        &self,
        desired: &DesiredConnectionSet,
        established_by: &EstablishedBy,
    ) -> EngineResult<BatchResult> {
        let live = self.live_graph().await?;

        let stale = self.tracked.realign(&live);
        if stale > 0 {
            debug!(stale, "Dropped tracked connections no longer live");
        }

        let plan = plan(desired, &live, &self.tracked.connections());
        if plan.is_empty() {
            debug!("Live graph already matches desired set");
            return Ok(BatchResult::default());
        }

        let operations = plan.operations();
        let batch = self.router.execute_batch(&operations).await;
        self.apply_tracking(&live, &operations, &batch, established_by);

        if batch.all_succeeded() {
            info!(removed = plan.to_remove.len(), added = plan.to_add.len(), "Reconciliation finished");
        } else {
            warn!(
                removed = plan.to_remove.len(),
                added = plan.to_add.len(),
                failed = batch.failed,
                "Reconciliation finished with failures"
            );
        }
        Ok(batch)
    }

    fn apply_tracking(
        &self,
        live: &LiveGraph,
        operations: &[BatchOperation],
        batch: &BatchResult,
        established_by: &EstablishedBy,
    ) {
        for (index, op) in operations.iter().enumerate() {
            if !batch.op_succeeded(index) {
                continue;
            }
            let connection = live.canonical(&Connection::new(op.from.clone(), op.to.clone()));
            match op.kind {
                BatchOpKind::Connect => self.tracked.record(connection, established_by.clone()),
                BatchOpKind::Disconnect => {
                    self.tracked.forget(&connection);
                    self.tracked.forget(&connection.reversed());
                }
            }
        }
    }

    /// Invert the live membership of one pair.
    ///
    /// # Errors
    /// `AliasResolutionFailed`, `InvalidArgument`, `ConcurrentUpdateRejected`
    /// or a failed live-graph query.
    pub async fn toggle(&self, from: &str, to: &str) -> EngineResult<ToggleOutcome> {
        let connection = self.devices.resolve_pair(from, to)?;
        let _guard = self.gate.try_acquire()?;

        let live = self.live_graph().await?;
        let action = if live.has_edge(&connection) { ToggleAction::Disconnect } else { ToggleAction::Connect };

        let result = match action {
            ToggleAction::Connect => self.connect_locked(&connection, &live).await?,
            ToggleAction::Disconnect => self.disconnect_locked(&connection).await?,
        };

        info!(%connection, ?action, success = result.success, "Toggled connection");
        Ok(ToggleOutcome { action, connection, result })
    }

    /// Connect one pair and track it as manual.
    ///
    /// An edge that already exists counts as connected.
    ///
    /// # Errors
    /// `AliasResolutionFailed`, `InvalidArgument` or `ConcurrentUpdateRejected`.
    pub async fn connect(&self, from: &str, to: &str) -> EngineResult<ExecutionResult> {
        let connection = self.devices.resolve_pair(from, to)?;
        let _guard = self.gate.try_acquire()?;
        self.connect_locked(&connection, &LiveGraph::default()).await
    }

    /// Disconnect one pair and stop tracking it.
    ///
    /// # Errors
    /// `AliasResolutionFailed`, `InvalidArgument` or `ConcurrentUpdateRejected`.
    pub async fn disconnect(&self, from: &str, to: &str) -> EngineResult<ExecutionResult> {
        let connection = self.devices.resolve_pair(from, to)?;
        let _guard = self.gate.try_acquire()?;
        self.disconnect_locked(&connection).await
    }

    /// Tracked in `live`'s orientation; with an empty graph that falls back
    /// to the port naming convention.
    async fn connect_locked(&self, connection: &Connection, live: &LiveGraph) -> EngineResult<ExecutionResult> {
        let command = RouterCommand::Connect { from: connection.from.clone(), to: connection.to.clone() };
        let result = self.router.execute(&command).await?.accept_already_connected();
        if result.success {
            let canonical = live.canonical(connection);
            self.tracked.forget(&canonical.reversed());
            self.tracked.record(canonical, EstablishedBy::Manual);
        } else {
            warn!(%connection, error = %result.error_message(), "Connect failed");
        }
        Ok(result)
    }

    async fn disconnect_locked(&self, connection: &Connection) -> EngineResult<ExecutionResult> {
        let command =
            RouterCommand::Disconnect { from: connection.from.clone(), to: connection.to.clone() };
        let result = self.router.execute(&command).await?;
        if result.success {
            self.tracked.forget(connection);
            self.tracked.forget(&connection.reversed());
        } else {
            warn!(%connection, error = %result.error_message(), "Disconnect failed");
        }
        Ok(result)
    }

    /// Disconnect every live connection, tracked or not.
    ///
    /// # Errors
    /// `ConcurrentUpdateRejected` or a failed live-graph query.
    pub async fn clear_all(&self) -> EngineResult<ClearOutcome> {
        let _guard = self.gate.try_acquire()?;
        let live = self.live_graph().await?;
        self.tracked.realign(&live);

        let operations: Vec<_> =
            live.iter().map(|c| BatchOperation::disconnect(&c.from, &c.to)).collect();
        let batch = self.router.execute_batch(&operations).await;
        self.apply_tracking(&live, &operations, &batch, &EstablishedBy::Manual);

        info!(cleared = batch.succeeded, failed = batch.failed, "Cleared live connections");
        Ok(ClearOutcome { cleared: batch.succeeded, batch })
    }

    /// Re-establish previously tracked connections.
    ///
    /// Entries already live are adopted; missing ones are connected.
    /// Metadata of every restored entry is preserved and the entry is keyed
    /// in the live graph's orientation.
    ///
    /// # Errors
    /// `ConcurrentUpdateRejected` or a failed live-graph query.
    pub async fn replay(&self, entries: &[TrackedConnection]) -> EngineResult<BatchResult> {
        let _guard = self.gate.try_acquire()?;
        let live = self.live_graph().await?;
        self.tracked.realign(&live);

        let adopt = |entry: &TrackedConnection| {
            let connection = live.canonical(&entry.connection);
            self.tracked.forget(&connection.reversed());
            self.tracked.adopt(TrackedConnection { connection, ..entry.clone() });
        };

        let mut pending = Vec::new();
        for entry in entries {
            if live.has_edge(&entry.connection) {
                adopt(entry);
            } else {
                pending.push(entry);
            }
        }

        let operations: Vec<_> = pending
            .iter()
            .map(|e| BatchOperation::connect(&e.connection.from, &e.connection.to))
            .collect();
        let batch = self.router.execute_batch(&operations).await;

        for (index, entry) in pending.into_iter().enumerate() {
            if batch.op_succeeded(index) {
                adopt(entry);
            }
        }

        info!(
            adopted = entries.len() - operations.len(),
            reconnected = batch.succeeded,
            failed = batch.failed,
            "Replayed tracked connections"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use jackbridge_core::PortDirection;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::TransportResult;

    /// In-memory router speaking `jack_lsp` text.
    #[derive(Default)]
    struct FakeRouter {
        edges: Mutex<BTreeSet<Connection>>,
        fail_connect: Mutex<BTreeSet<Connection>>,
        calls: Mutex<Vec<RouterCommand>>,
        delay: Option<Duration>,
    }

    impl FakeRouter {
        fn with_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
            let router = Self::default();
            router.edges.lock().extend(edges.into_iter().map(|(f, t)| Connection::new(f, t)));
            router
        }

        fn edges(&self) -> BTreeSet<Connection> {
            self.edges.lock().clone()
        }

        fn writes(&self) -> Vec<RouterCommand> {
            self.calls.lock().iter().filter(|c| c.is_write()).cloned().collect()
        }

        fn listing(&self) -> String {
            let mut by_port: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for c in self.edges.lock().iter() {
                by_port.entry(c.from.clone()).or_default().push(c.to.clone());
                by_port.entry(c.to.clone()).or_default().push(c.from.clone());
            }
            let mut text = String::new();
            for (port, peers) in by_port {
                text.push_str(&port);
                text.push('\n');
                for peer in peers {
                    text.push_str("   ");
                    text.push_str(&peer);
                    text.push('\n');
                }
            }
            text
        }

        fn port_listing(&self) -> String {
            let names: BTreeSet<String> =
                self.edges.lock().iter().flat_map(|c| [c.from.clone(), c.to.clone()]).collect();
            let mut text = String::new();
            for name in names {
                let props = match PortDirection::from_name(&name) {
                    Some(PortDirection::Output) => "output,",
                    Some(PortDirection::Input) => "input,",
                    None => "",
                };
                text.push_str(&format!("{name}\n\tproperties: {props}\n"));
            }
            text
        }
    }

    impl RouterControl for FakeRouter {
        async fn execute(&self, command: &RouterCommand) -> TransportResult<ExecutionResult> {
            command.validate()?;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().push(command.clone());

            let ok = |stdout: String| ExecutionResult::from_exit(0, stdout, String::new(), Duration::from_millis(1));
            let fail = |stderr: &str| {
                ExecutionResult::from_exit(1, String::new(), stderr.to_string(), Duration::from_millis(1))
            };

            Ok(match command {
                RouterCommand::ListConnections => ok(self.listing()),
                RouterCommand::ListPorts => ok(self.port_listing()),
                RouterCommand::Probe => ok("running\n".to_string()),
                RouterCommand::Connect { from, to } => {
                    let c = Connection::new(from.as_str(), to.as_str());
                    if self.fail_connect.lock().contains(&c) {
                        fail("cannot connect")
                    } else if self.edges.lock().insert(c) {
                        ok(String::new())
                    } else {
                        fail("cannot connect client, already connected?")
                    }
                }
                RouterCommand::Disconnect { from, to } => {
                    let c = Connection::new(from.as_str(), to.as_str());
                    let mut edges = self.edges.lock();
                    if edges.remove(&c) || edges.remove(&c.reversed()) {
                        ok(String::new())
                    } else {
                        fail("not connected")
                    }
                }
            })
        }
    }

    fn devices() -> DeviceMap {
        DeviceMap::new([
            ("input_1", "system:capture_1"),
            ("input_2", "system:capture_2"),
            ("main_out_l", "system:playback_1"),
            ("main_out_r", "system:playback_2"),
        ])
    }

    fn presets() -> Vec<Preset> {
        vec![
            Preset::new("stereo")
                .with("input_1", "main_out_l")
                .with("input_2", "main_out_l")
                .with("input_2", "main_out_r"),
            Preset::new("mono").with("input_1", "main_out_l"),
            Preset::new("broken").with("input_1", "sub_out"),
        ]
    }

    fn engine(router: FakeRouter) -> ReconciliationEngine<FakeRouter> {
        ReconciliationEngine::new(Arc::new(router), devices(), presets())
    }

    fn conn(from: &str, to: &str) -> Connection {
        Connection::new(from, to)
    }

    #[tokio::test]
    async fn test_preset_on_empty_graph_then_idempotent() {
        let engine = engine(FakeRouter::default());

        let batch = engine.apply_preset("stereo").await.unwrap();
        assert_eq!(batch.total_ops, 3);
        assert_eq!(batch.succeeded, 3);
        assert_eq!(engine.tracked().len(), 3);
        assert_eq!(engine.router().writes().len(), 3);
        assert!(engine.router().writes().iter().all(|c| matches!(c, RouterCommand::Connect { .. })));

        let again = engine.apply_preset("stereo").await.unwrap();
        assert_eq!(again.total_ops, 0);
        assert_eq!(engine.router().writes().len(), 3);
        assert_eq!(engine.tracked().len(), 3);
    }

    #[tokio::test]
    async fn test_preset_change_never_removes_untracked() {
        let router = FakeRouter::with_edges([("system:capture_1", "system:playback_2")]);
        let engine = engine(router);

        engine.apply_preset("stereo").await.unwrap();
        let batch = engine.apply_preset("mono").await.unwrap();

        assert_eq!(batch.total_ops, 2);
        let edges = engine.router().edges();
        assert!(edges.contains(&conn("system:capture_1", "system:playback_2")));
        assert!(edges.contains(&conn("system:capture_1", "system:playback_1")));
        assert_eq!(edges.len(), 2);

        let tracked: Vec<_> = engine.tracked().into_iter().map(|t| t.connection).collect();
        assert_eq!(tracked, vec![conn("system:capture_1", "system:playback_1")]);
    }

    #[tokio::test]
    async fn test_removals_issued_before_additions() {
        let engine = engine(FakeRouter::default());
        engine.apply_preset("mono").await.unwrap();

        let desired: DesiredConnectionSet =
            [conn("system:capture_2", "system:playback_2")].into_iter().collect();
        engine.apply_desired(&desired, EstablishedBy::Manual).await.unwrap();

        let writes = engine.router().writes();
        assert_matches!(&writes[1], RouterCommand::Disconnect { from, .. } if from == "system:capture_1");
        assert_matches!(&writes[2], RouterCommand::Connect { from, .. } if from == "system:capture_2");
    }

    #[tokio::test]
    async fn test_partial_failure_tracks_only_successes() {
        let router = FakeRouter::default();
        router.fail_connect.lock().insert(conn("system:capture_2", "system:playback_1"));
        let engine = engine(router);

        let batch = engine.apply_preset("stereo").await.unwrap();
        assert_eq!(batch.total_ops, 3);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.errors[0].message, "cannot connect");
        assert_eq!(engine.tracked().len(), 2);
    }

    #[tokio::test]
    async fn test_unresolved_alias_issues_nothing() {
        let engine = engine(FakeRouter::default());

        let result = engine.apply_preset("broken").await;
        assert_matches!(
            result,
            Err(EngineError::Core(CoreError::AliasResolutionFailed { unresolved })) if unresolved == ["sub_out"]
        );
        assert!(engine.router().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_preset() {
        let engine = engine(FakeRouter::default());
        assert_matches!(
            engine.apply_preset("nope").await,
            Err(EngineError::Core(CoreError::PresetNotFound(_)))
        );
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let engine = engine(FakeRouter::default());

        let first = engine.toggle("input_1", "main_out_l").await.unwrap();
        assert_eq!(first.action, ToggleAction::Connect);
        assert!(first.result.success);
        assert!(engine.router().edges().contains(&conn("system:capture_1", "system:playback_1")));
        assert_eq!(engine.tracked()[0].established_by, EstablishedBy::Manual);

        let second = engine.toggle("input_1", "main_out_l").await.unwrap();
        assert_eq!(second.action, ToggleAction::Disconnect);
        assert!(engine.router().edges().is_empty());
        assert!(engine.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_reversed_pair_disconnects() {
        let router = FakeRouter::with_edges([("system:capture_1", "system:playback_1")]);
        let engine = engine(router);

        let outcome = engine.toggle("main_out_l", "input_1").await.unwrap();
        assert_eq!(outcome.action, ToggleAction::Disconnect);
        assert!(engine.router().edges().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_preset_rejected() {
        let router = FakeRouter { delay: Some(Duration::from_millis(100)), ..FakeRouter::default() };
        let engine = engine(router);

        let (first, second) = tokio::join!(engine.apply_preset("stereo"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.apply_preset("mono").await
        });

        assert_eq!(first.unwrap().succeeded, 3);
        assert_matches!(second, Err(EngineError::ConcurrentUpdateRejected));
        assert!(!engine.is_updating());
    }

    #[tokio::test]
    async fn test_clear_all_removes_untracked_too() {
        let router = FakeRouter::with_edges([("other:out", "system:playback_2")]);
        let engine = engine(router);
        engine.apply_preset("mono").await.unwrap();

        let outcome = engine.clear_all().await.unwrap();
        assert_eq!(outcome.cleared, 2);
        assert!(engine.router().edges().is_empty());
        assert!(engine.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_connect_existing_edge_is_success() {
        let router = FakeRouter::with_edges([("system:capture_1", "system:playback_1")]);
        let engine = engine(router);

        let result = engine.connect("input_1", "main_out_l").await.unwrap();
        assert!(result.success);
        assert_eq!(engine.tracked().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_port_rejected() {
        let engine = engine(FakeRouter::default());
        assert_matches!(engine.connect("input_1", "no-colon").await, Err(EngineError::Core(_)));
        assert!(engine.router().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_replay_adopts_live_and_reconnects_missing() {
        let router = FakeRouter::with_edges([("system:capture_1", "system:playback_1")]);
        let engine = engine(router);

        let entries = vec![
            TrackedConnection::now(
                conn("system:capture_1", "system:playback_1"),
                EstablishedBy::Preset("stereo".into()),
            ),
            TrackedConnection::now(
                conn("system:capture_2", "system:playback_2"),
                EstablishedBy::Preset("stereo".into()),
            ),
        ];

        let batch = engine.replay(&entries).await.unwrap();
        assert_eq!(batch.total_ops, 1);
        assert_eq!(engine.tracked(), entries);
        assert_eq!(engine.router().edges().len(), 2);
    }

    #[tokio::test]
    async fn test_status_lists_each_edge_once() {
        let router = FakeRouter::with_edges([
            ("system:capture_1", "system:playback_1"),
            ("system:capture_2", "system:playback_1"),
        ]);
        let engine = engine(router);

        let status = engine.status().await.unwrap();
        assert_eq!(status.live.len(), 2);
        assert!(status.tracked.is_empty());
        assert!(engine.is_router_alive().await);
    }

    #[tokio::test]
    async fn test_reversed_connect_is_tracked_in_live_orientation() {
        let engine = engine(FakeRouter::default());

        engine.connect("main_out_l", "input_1").await.unwrap();
        let status = engine.status().await.unwrap();
        assert_eq!(status.live, vec![conn("system:capture_1", "system:playback_1")]);
        let tracked: Vec<_> = status.tracked.iter().map(|t| t.connection.clone()).collect();
        assert_eq!(tracked, status.live);

        let batch = engine.apply_desired(&DesiredConnectionSet::default(), EstablishedBy::Manual).await.unwrap();
        assert_eq!(batch.succeeded, 1);
        assert!(engine.router().edges().is_empty());
        assert!(engine.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_ports_follow_live_orientation() {
        let engine = engine(FakeRouter::default());

        // Neither name implies a direction; the live graph picks one.
        engine.connect("synth:a", "mixer:b").await.unwrap();
        let status = engine.status().await.unwrap();
        assert_eq!(status.live, vec![conn("mixer:b", "synth:a")]);
        assert_eq!(status.tracked[0].connection, conn("mixer:b", "synth:a"));

        let batch = engine.apply_desired(&DesiredConnectionSet::default(), EstablishedBy::Manual).await.unwrap();
        assert_eq!(batch.succeeded, 1);
        assert!(engine.router().edges().is_empty());
    }

    #[tokio::test]
    async fn test_reversed_preset_pair_is_kept_and_then_removed() {
        let engine = engine(FakeRouter::default());
        let reversed: DesiredConnectionSet =
            [conn("system:playback_1", "system:capture_1")].into_iter().collect();

        engine.apply_desired(&reversed, EstablishedBy::Preset("rev".into())).await.unwrap();
        let again = engine.apply_desired(&reversed, EstablishedBy::Preset("rev".into())).await.unwrap();
        assert_eq!(again.total_ops, 0);
        assert_eq!(engine.tracked()[0].connection, conn("system:capture_1", "system:playback_1"));

        let stereo = engine.apply_preset("stereo").await.unwrap();
        assert_eq!(stereo.total_ops, 2);
        assert_eq!(engine.router().edges().len(), 3);
        assert_eq!(engine.tracked().len(), 3);
    }

    #[tokio::test]
    async fn test_replay_keys_reversed_entries_by_live_edge() {
        let router = FakeRouter::with_edges([("system:capture_1", "system:playback_1")]);
        let engine = engine(router);
        let entry =
            TrackedConnection::now(conn("system:playback_1", "system:capture_1"), EstablishedBy::Manual);

        let batch = engine.replay(std::slice::from_ref(&entry)).await.unwrap();
        assert_eq!(batch.total_ops, 0);
        let tracked = engine.tracked();
        assert_eq!(tracked[0].connection, conn("system:capture_1", "system:playback_1"));
        assert_eq!(tracked[0].established_at, entry.established_at);
    }

    #[test]
    fn test_plan_matches_either_orientation() {
        let live: LiveGraph = [conn("a:out", "b:in")].into_iter().collect();
        let tracked: BTreeSet<_> = [conn("a:out", "b:in")].into_iter().collect();
        let desired: DesiredConnectionSet =
            [conn("b:in", "a:out"), conn("d:in", "c:out"), conn("c:out", "d:in")].into_iter().collect();

        let plan = plan(&desired, &live, &tracked);
        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.to_add.len(), 1);
    }

    #[test]
    fn test_plan() {
        let live: LiveGraph = [conn("a:out", "b:in"), conn("c:out", "b:in"), conn("x:out", "y:in")]
            .into_iter()
            .collect();
        let tracked: BTreeSet<_> = [conn("a:out", "b:in"), conn("c:out", "b:in")].into_iter().collect();
        let desired: DesiredConnectionSet = [conn("a:out", "b:in"), conn("d:out", "b:in")].into_iter().collect();

        let plan = plan(&desired, &live, &tracked);
        assert_eq!(plan.to_remove, vec![conn("c:out", "b:in")]);
        assert_eq!(plan.to_add, vec![conn("d:out", "b:in")]);
        assert_matches!(plan.operations()[0].kind, BatchOpKind::Disconnect);
    }
}
