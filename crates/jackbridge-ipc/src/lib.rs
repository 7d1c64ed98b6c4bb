//! JackBridge IPC - Unix socket protocol and client library.
//!
//! This crate defines the newline-delimited JSON protocol between the daemon
//! and its clients, and provides a client library for talking to the daemon.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{
    ConnectionsChangedData, ErrorData, Event, EventType, PresetAppliedData, RouterStatusData,
    StateRestoredData,
};
pub use messages::{ErrorInfo, Method, Request, Response};
pub use server::{IncomingRequest, IpcServer};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/jackbridge/daemon.sock` or falls back to
/// `/run/user/$UID/jackbridge/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("jackbridge/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/jackbridge/daemon.sock"))
    }
}
