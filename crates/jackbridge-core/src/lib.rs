//! JackBridge Core - Domain model for JACK connection management.
//!
//! This crate contains the types shared between the router control layer,
//! the state store, the IPC protocol and the daemon: ports, connections,
//! tracked connections, the alias device map and presets.

pub mod connection;
pub mod device;
pub mod error;
pub mod port;
pub mod preset;
pub mod state;

pub use connection::{Connection, EstablishedBy, TrackedConnection};
pub use device::{DesiredConnectionSet, DeviceMap};
pub use error::{Error, Result};
pub use port::{Port, PortDirection};
pub use preset::{Preset, PresetSummary};
pub use state::{GraphStatus, RouterState, StateSnapshot};
