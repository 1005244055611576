//! Unix domain socket server for IPC
//!
//! Provides request-response queries over the binding registry and pushes
//! activation notifications to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::dispatch::KeybindingService;
use crate::lifecycle::ConfigReloader;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted request body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Outgoing frames queued per client
const CLIENT_QUEUE: usize = 32;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with client handlers
struct Shared {
    service: Arc<KeybindingService>,
    reloader: Arc<ConfigReloader>,
    start_time: Instant,
    hook_installed: AtomicBool,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        service: Arc<KeybindingService>,
        reloader: Arc<ConfigReloader>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared: Arc::new(Shared {
                service,
                reloader,
                start_time: Instant::now(),
                hook_installed: AtomicBool::new(false),
            }),
            shutdown_tx,
        })
    }

    /// Record whether the OS key hook is live, for status queries
    pub fn set_hook_installed(&self, installed: bool) {
        self.shared.hook_installed.store(installed, Ordering::SeqCst);
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Responses and notifications share one writer task so frames never
    /// interleave on the socket. Both helper tasks live in a `JoinSet`, so
    /// dropping this future (server shutdown) aborts them too.
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE);
        let mut tasks = JoinSet::new();
        tasks.spawn(Self::write_frames(writer, out_rx));
        let mut forwarder: Option<AbortHandle> = None;

        let result =
            Self::serve_requests(reader, &shared, &out_tx, &mut tasks, &mut forwarder).await;

        // Stop pushing, then let the writer flush what is queued
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        drop(out_tx);
        while tasks.join_next().await.is_some() {}

        result
    }

    /// Read requests until the client disconnects
    async fn serve_requests(
        mut reader: OwnedReadHalf,
        shared: &Arc<Shared>,
        out_tx: &mpsc::Sender<Vec<u8>>,
        tasks: &mut JoinSet<()>,
        forwarder: &mut Option<AbortHandle>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");
                    if request == Request::Subscribe && forwarder.is_none() {
                        *forwarder = Some(tasks.spawn(Self::forward_activations(shared, out_tx.clone())));
                        debug!("client subscribed to activations");
                    }
                    Self::process_request(request, shared)
                }
                Err(e) => Response::error("bad_request", e.to_string()),
            };

            if out_tx.send(encode_frame(&response)?).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Drain queued frames onto the socket
    async fn write_frames(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Vec<u8>>) {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                debug!(?e, "client write failed");
                break;
            }
        }
    }

    /// Push every activation to one client until it goes away
    fn forward_activations(
        shared: &Shared,
        out_tx: mpsc::Sender<Vec<u8>>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = shared.service.subscribe();

        async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged behind activations");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let frame = match encode_frame(&Notification::Activated(event)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).await.is_err() {
                    break;
                }
            }
        }
    }

    /// Process a request and return a response
    fn process_request(request: Request, shared: &Shared) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let snapshot = shared.service.snapshot();
                Response::Status(DaemonStatus {
                    hook_installed: shared.hook_installed.load(Ordering::SeqCst),
                    binding_count: snapshot.len(),
                    pressed_keys: shared.service.pressed_count(),
                    generation: snapshot.generation(),
                    uptime_secs: shared.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                })
            }

            Request::ListBindings => Response::Bindings {
                bindings: shared.service.bindings(),
            },

            Request::IsActive { expression } => match shared.service.is_active(&expression) {
                Some(active) => Response::Active { expression, active },
                None => Response::error("unknown_binding", format!("no binding <{expression}>")),
            },

            Request::Reload => match shared.reloader.reload() {
                Ok(report) => {
                    info!(?report, "configuration reloaded via IPC");
                    Response::Reloaded(report)
                }
                Err(e) => Response::error("reload_failed", e.to_string()),
            },

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Encode a length-prefixed JSON frame
fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}
