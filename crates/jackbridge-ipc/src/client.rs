//! IPC client implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Method, Request, Response};

/// Default upper bound for a request; long enough for a full restore.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// IPC client for connecting to the JackBridge daemon.
pub struct IpcClient {
    writer: Arc<Mutex<tokio::net::unix::OwnedWriteHalf>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
    event_rx: mpsc::Receiver<Event>,
    timeout: Duration,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(64);

        let pending_clone = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("Connection closed");
                        break;
                    }
                    Ok(_) => {
                        if let Ok(response) = serde_json::from_str::<Response>(&line) {
                            if let Some(tx) = pending_clone.lock().await.remove(&response.id) {
                                let _ = tx.send(response);
                            }
                        } else if let Ok(event) = serde_json::from_str::<Event>(&line) {
                            let _ = event_tx.send(event).await;
                        } else {
                            warn!("Unknown message format");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                }
            }

            // Wake every waiter with ConnectionClosed.
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            next_id: AtomicU64::new(1),
            pending,
            event_rx,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect_default() -> IpcResult<Self> {
        Self::connect(&crate::socket_path()).await
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for a response.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent, the connection
    /// closes, or no response arrives within the timeout.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, method };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let json = serde_json::to_string(&request)? + "\n";
        let written = self.writer.lock().await.write_all(json.as_bytes()).await;
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a request and unwrap its result.
    ///
    /// # Errors
    /// Transport errors as for [`Self::request`], or
    /// [`IpcError::ServerError`] carrying the daemon's error.
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method).await?.result.map_err(IpcError::ServerError)
    }

    /// Get the event receiver for incoming events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }
}
