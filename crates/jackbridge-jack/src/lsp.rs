//! Parsing of `jack_lsp` listings.
//!
//! `jack_lsp` prints one port per unindented line. With `-c` the lines that
//! follow a port, indented, name the ports it is connected to; with `-p` they
//! carry the port's `properties:`.

use std::collections::BTreeSet;

use jackbridge_core::{Connection, Port, PortDirection};
use tracing::debug;

/// Connections parsed from a `jack_lsp -c` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConnections {
    /// One entry per (source, indented destination) pair
    pub connections: BTreeSet<Connection>,
    /// Lines that could not be attributed to a source
    pub skipped: usize,
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

/// Parse a `jack_lsp -c` listing.
///
/// Indented lines before any source port, and self-loops, are skipped and
/// counted. Empty input yields an empty set.
#[must_use]
pub fn parse_connections(text: &str) -> ParsedConnections {
    let mut parsed = ParsedConnections::default();
    let mut source: Option<&str> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !is_indented(line) {
            source = Some(line.trim_end());
            continue;
        }

        let destination = line.trim();
        match source.map(|src| Connection::new(src, destination)) {
            Some(connection) if !connection.is_self_loop() => {
                parsed.connections.insert(connection);
            }
            _ => {
                debug!(line = destination, "Skipping unattributed connection line");
                parsed.skipped += 1;
            }
        }
    }

    parsed
}

/// Parse a `jack_lsp -p` listing into ports.
///
/// Ports without a `properties:` line keep an unknown direction; callers use
/// [`Port::effective_direction`] to fall back to the naming convention.
#[must_use]
pub fn parse_ports(text: &str) -> Vec<Port> {
    let mut ports: Vec<Port> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !is_indented(line) {
            ports.push(Port { name: line.trim_end().to_string(), direction: None });
            continue;
        }

        if let (Some(port), Some(direction)) = (ports.last_mut(), PortDirection::from_properties(line)) {
            port.direction = Some(direction);
        }
    }

    ports
}
