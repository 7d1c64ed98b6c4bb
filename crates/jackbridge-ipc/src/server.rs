//! IPC server implementation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::events::{Event, EventType};
use crate::messages::{ErrorInfo, Method, Request, Response};

/// A request forwarded to the daemon, with the channel to answer on.
#[derive(Debug)]
pub struct IncomingRequest {
    pub client_id: u64,
    pub request: Request,
    reply: mpsc::Sender<Response>,
}

impl IncomingRequest {
    /// Send the response back to the requesting client.
    pub async fn respond(self, result: Result<Value, ErrorInfo>) {
        let response = Response { id: self.request.id, result };
        if self.reply.send(response).await.is_err() {
            debug!(client_id = self.client_id, "Client gone before response");
        }
    }
}

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<IncomingRequest>,
}

struct ClientHandle {
    /// Empty means every event type
    subscriptions: HashSet<EventType>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<IncomingRequest>)> {
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                path: socket_path.to_path_buf(),
                clients: Arc::new(RwLock::new(HashMap::new())),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let clients = Arc::clone(&self.clients);
                    let event_rx = self.event_tx.subscribe();
                    let request_tx = self.request_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_client(client_id, stream, clients, event_rx, request_tx).await
                        {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Broadcast an event to all subscribed clients.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    async fn handle_client(
        client_id: u64,
        stream: UnixStream,
        clients: Arc<RwLock<HashMap<u64, ClientHandle>>>,
        mut event_rx: broadcast::Receiver<Event>,
        request_tx: mpsc::Sender<IncomingRequest>,
    ) -> IpcResult<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);

        clients.write().await.insert(client_id, ClientHandle { subscriptions: HashSet::new() });

        loop {
            tokio::select! {
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => {
                            debug!(client_id, "Client disconnected");
                            break;
                        }
                        Ok(_) => {
                            match serde_json::from_str::<Request>(&line) {
                                Ok(request) => {
                                    debug!(client_id, request_id = request.id, "Received request");
                                    if let Some(response) =
                                        Self::handle_subscription(client_id, &request, &clients).await
                                    {
                                        if !write_line(&mut writer, &response).await {
                                            break;
                                        }
                                    } else {
                                        let incoming = IncomingRequest {
                                            client_id,
                                            request,
                                            reply: response_tx.clone(),
                                        };
                                        if request_tx.send(incoming).await.is_err() {
                                            warn!(client_id, "Request handler gone");
                                            break;
                                        }
                                    }
                                }
                                Err(e) => warn!(client_id, error = %e, "Invalid request format"),
                            }
                            line.clear();
                        }
                        Err(e) => {
                            error!(client_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                Some(response) = response_rx.recv() => {
                    if !write_line(&mut writer, &response).await {
                        break;
                    }
                }

                Ok(event) = event_rx.recv() => {
                    let wanted = clients.read().await.get(&client_id).is_some_and(|handle| {
                        handle.subscriptions.is_empty() || handle.subscriptions.contains(&event.event)
                    });
                    if wanted && !write_line(&mut writer, &event).await {
                        break;
                    }
                }
            }
        }

        clients.write().await.remove(&client_id);
        info!(client_id, "Client handler exiting");
        Ok(())
    }

    /// Answer subscription requests in place; everything else goes to the daemon.
    async fn handle_subscription(
        client_id: u64,
        request: &Request,
        clients: &RwLock<HashMap<u64, ClientHandle>>,
    ) -> Option<Response> {
        let (events, subscribe) = match &request.method {
            Method::Subscribe { events } => (events, true),
            Method::Unsubscribe { events } => (events, false),
            _ => return None,
        };

        let parsed: Result<Vec<EventType>, String> = events
            .iter()
            .map(|name| name.parse::<EventType>().map_err(|_| name.clone()))
            .collect();

        let result = match parsed {
            Ok(types) => {
                let mut clients = clients.write().await;
                if let Some(handle) = clients.get_mut(&client_id) {
                    if subscribe {
                        handle.subscriptions.extend(types);
                    } else {
                        for t in &types {
                            handle.subscriptions.remove(t);
                        }
                    }
                    debug!(client_id, subscriptions = ?handle.subscriptions, "Subscriptions updated");
                }
                Ok(json!({"success": true}))
            }
            Err(name) => Err(ErrorInfo::new(400, "invalid_argument", format!("Unknown event type: {name}"))),
        };

        Some(Response { id: request.id, result })
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Write one JSON line. Returns false if the client is gone.
async fn write_line(writer: &mut OwnedWriteHalf, message: &impl Serialize) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json + "\n",
        Err(e) => {
            error!(error = %e, "Failed to serialize message");
            return true;
        }
    };
    if let Err(e) = writer.write_all(json.as_bytes()).await {
        error!(error = %e, "Write error");
        return false;
    }
    true
}
