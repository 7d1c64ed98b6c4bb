//! Logical endpoint aliases and desired connection sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::port::is_port_name;

/// Maps logical endpoint aliases (`input_1`, `main_out_l`) to physical ports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceMap {
    aliases: BTreeMap<String, String>,
}

impl DeviceMap {
    /// Create a device map from `(alias, port)` pairs.
    #[must_use]
    pub fn new<I, A, P>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        Self { aliases: aliases.into_iter().map(|(a, p)| (a.into(), p.into())).collect() }
    }

    /// Resolve an endpoint to a physical port name.
    ///
    /// Known aliases win; otherwise a well-formed `client:port` name is
    /// passed through unchanged.
    #[must_use]
    pub fn resolve_endpoint(&self, endpoint: &str) -> Option<String> {
        if let Some(port) = self.aliases.get(endpoint) {
            return Some(port.clone());
        }
        is_port_name(endpoint).then(|| endpoint.to_string())
    }

    /// Resolve a single `(from, to)` pair.
    ///
    /// # Errors
    /// Returns [`Error::AliasResolutionFailed`] naming every endpoint that
    /// could not be resolved.
    pub fn resolve_pair(&self, from: &str, to: &str) -> Result<Connection> {
        let mut set = self.resolve_pairs([(from, to)])?;
        set.connections.pop_first().ok_or_else(|| Error::AliasResolutionFailed {
            unresolved: vec![from.to_string(), to.to_string()],
        })
    }

    /// Resolve a list of `(from, to)` endpoint pairs into a desired set.
    ///
    /// Resolution is all-or-nothing: a single unknown endpoint rejects the
    /// whole set.
    ///
    /// # Errors
    /// Returns [`Error::AliasResolutionFailed`] listing the unresolved endpoints.
    pub fn resolve_pairs<I, F, T>(&self, pairs: I) -> Result<DesiredConnectionSet>
    where
        I: IntoIterator<Item = (F, T)>,
        F: AsRef<str>,
        T: AsRef<str>,
    {
        let mut connections = BTreeSet::new();
        let mut unresolved = Vec::new();

        for (from, to) in pairs {
            let (from, to) = (from.as_ref(), to.as_ref());
            match (self.resolve_endpoint(from), self.resolve_endpoint(to)) {
                (Some(f), Some(t)) => {
                    connections.insert(Connection::new(f, t));
                }
                (f, t) => {
                    if f.is_none() {
                        unresolved.push(from.to_string());
                    }
                    if t.is_none() {
                        unresolved.push(to.to_string());
                    }
                }
            }
        }

        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            debug!(?unresolved, "Alias resolution failed");
            return Err(Error::AliasResolutionFailed { unresolved });
        }

        Ok(DesiredConnectionSet { connections })
    }

    /// Whether an alias is defined.
    #[must_use]
    pub fn contains_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Iterate over `(alias, port)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, p)| (a.as_str(), p.as_str()))
    }
}

/// The set of connections a caller wants active, in physical port names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConnectionSet {
    connections: BTreeSet<Connection>,
}

impl DesiredConnectionSet {
    /// Whether the set contains a connection.
    #[must_use]
    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over the connections in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }
}

impl FromIterator<Connection> for DesiredConnectionSet {
    fn from_iter<I: IntoIterator<Item = Connection>>(iter: I) -> Self {
        Self { connections: iter.into_iter().collect() }
    }
}
