//! Live connection graph and the tracked set.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use jackbridge_core::{Connection, EstablishedBy, Port, PortDirection, TrackedConnection};
use parking_lot::RwLock;
use tracing::debug;

/// The router's live graph, one entry per physical edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveGraph {
    connections: BTreeSet<Connection>,
    /// Directions reported by `jack_lsp -p`
    directions: HashMap<String, PortDirection>,
}

/// Orient a pair output to input, or `None` when the directions do not
/// decide it (unknown, or both ends the same way).
fn orient(pair: &Connection, from: Option<PortDirection>, to: Option<PortDirection>) -> Option<Connection> {
    match (from, to) {
        (Some(a), Some(b)) if a == b => None,
        (Some(PortDirection::Output), _) | (_, Some(PortDirection::Input)) => Some(pair.clone()),
        (Some(PortDirection::Input), _) | (_, Some(PortDirection::Output)) => Some(pair.reversed()),
        (None, None) => None,
    }
}

impl LiveGraph {
    /// Build a live graph from parsed `jack_lsp -c` pairs.
    ///
    /// `jack_lsp -c` lists every edge from both ends. Only the orientation
    /// whose source is an output port is kept. Directions come from `ports`
    /// when reported, otherwise from the port naming convention.
    #[must_use]
    pub fn normalize(pairs: &BTreeSet<Connection>, ports: &[Port]) -> Self {
        let directions: HashMap<String, PortDirection> = ports
            .iter()
            .filter_map(|p| p.direction.map(|d| (p.name.clone(), d)))
            .collect();

        let mut graph = Self { connections: BTreeSet::new(), directions };
        for pair in pairs {
            let oriented = graph.orient(pair).unwrap_or_else(|| {
                let mirrored = pair.reversed();
                if pairs.contains(&mirrored) && mirrored < *pair { mirrored } else { pair.clone() }
            });
            graph.connections.insert(oriented);
        }

        debug!(raw = pairs.len(), edges = graph.connections.len(), "Normalized live graph");
        graph
    }

    fn direction(&self, name: &str) -> Option<PortDirection> {
        self.directions.get(name).copied().or_else(|| PortDirection::from_name(name))
    }

    fn orient(&self, pair: &Connection) -> Option<Connection> {
        orient(pair, self.direction(&pair.from), self.direction(&pair.to))
    }

    /// The orientation this graph uses for an edge: the live one if the
    /// edge is present, otherwise output to input where that is known.
    #[must_use]
    pub fn canonical(&self, connection: &Connection) -> Connection {
        if self.contains(connection) {
            return connection.clone();
        }
        let reversed = connection.reversed();
        if self.contains(&reversed) {
            return reversed;
        }
        self.orient(connection).unwrap_or_else(|| connection.clone())
    }

    /// Whether the edge is live.
    #[must_use]
    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    /// Whether the edge is live in either orientation.
    #[must_use]
    pub fn has_edge(&self, connection: &Connection) -> bool {
        self.contains(connection) || self.contains(&connection.reversed())
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the graph has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate edges in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// The underlying edge set.
    #[must_use]
    pub fn connections(&self) -> &BTreeSet<Connection> {
        &self.connections
    }

    /// Edges as a sorted vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Connection> {
        self.connections.iter().cloned().collect()
    }
}

impl FromIterator<Connection> for LiveGraph {
    fn from_iter<I: IntoIterator<Item = Connection>>(iter: I) -> Self {
        Self { connections: iter.into_iter().collect(), directions: HashMap::new() }
    }
}

/// Connections this system believes it created.
#[derive(Debug, Default)]
pub struct TrackedSet {
    entries: RwLock<BTreeMap<Connection, TrackedConnection>>,
}

impl TrackedSet {
    /// Create an empty tracked set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection established now.
    pub fn record(&self, connection: Connection, established_by: EstablishedBy) {
        debug!(%connection, by = %established_by, "Tracking connection");
        let entry = TrackedConnection::now(connection.clone(), established_by);
        self.entries.write().insert(connection, entry);
    }

    /// Track an existing entry unchanged, keeping its metadata.
    pub fn adopt(&self, entry: TrackedConnection) {
        self.entries.write().insert(entry.connection.clone(), entry);
    }

    /// Stop tracking a connection. Returns whether it was tracked.
    pub fn forget(&self, connection: &Connection) -> bool {
        self.entries.write().remove(connection).is_some()
    }

    /// Re-key entries to the live orientation of their edge and drop the
    /// ones no longer live. Returns how many were dropped.
    pub fn realign(&self, live: &LiveGraph) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let realigned: BTreeMap<Connection, TrackedConnection> = std::mem::take(&mut *entries)
            .into_values()
            .filter(|entry| live.has_edge(&entry.connection))
            .map(|mut entry| {
                entry.connection = live.canonical(&entry.connection);
                (entry.connection.clone(), entry)
            })
            .collect();
        *entries = realigned;
        before - entries.len()
    }

    /// Whether a connection is tracked.
    #[must_use]
    pub fn contains(&self, connection: &Connection) -> bool {
        self.entries.read().contains_key(connection)
    }

    /// The tracked connections without metadata.
    #[must_use]
    pub fn connections(&self) -> BTreeSet<Connection> {
        self.entries.read().keys().cloned().collect()
    }

    /// A copy of every tracked entry, sorted by connection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TrackedConnection> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
