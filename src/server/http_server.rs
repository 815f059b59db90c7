//! HTTP server implementation.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::parser::Endpoints;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::error::Error;
use crate::server::router::Router;

const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Length: 45\r\n\
Connection: close\r\n\
\r\n\
Server is at capacity, please try again later";

/// An HTTP server.
pub struct HttpServer {
    /// The server configuration.
    pub config: Arc<ServerConfig>,
    /// The routes.
    pub router: Arc<Router>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and routes.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
        }
    }

    /// Bind the configured address and serve until Ctrl+C.
    pub async fn start(&self) -> Result<(), Error> {
        let listener = self.setup_listener().await?;
        self.serve(listener).await
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let addr = self.config.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        info!("Server listening on http://{addr}");
        Ok(listener)
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: mpsc::Sender<()>, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        });
    }

    /// Handle a new connection.
    fn handle_new_connection(&self, mut socket: TcpStream, semaphore: &Arc<Semaphore>, tasks: &mut JoinSet<()>) {
        let endpoints = match (socket.local_addr(), socket.peer_addr()) {
            (Ok(local), Ok(remote)) => Endpoints { local, remote },
            (Err(e), _) | (_, Err(e)) => {
                warn!("Dropping connection with unknown address: {e}");
                return;
            }
        };

        // Try to acquire a permit from the semaphore
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {}", endpoints.remote);
                tasks.spawn(async move {
                    let _ = socket.write_all(SERVICE_UNAVAILABLE).await;
                    let _ = socket.shutdown().await;
                });
                return;
            }
        };

        let connection = Connection::new(socket, endpoints, self.router.clone(), self.config.clone());
        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;
            connection.run().await;
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) {
        error!("Error accepting connection: {e}");
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(&self, tasks: &mut JoinSet<()>) {
        // Wait for all tasks to complete (with timeout)
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown timed out, aborting {len} connections", len = tasks.len());
            tasks.abort_all();
        }

        self.router.shutdown();
        info!("Server shutdown complete");
    }

    /// Accept connections on `listener` until Ctrl+C.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let mut tasks = JoinSet::new();
        Self::setup_ctrl_c_handler(shutdown_tx, &mut tasks);
        self.serve_until(listener, shutdown_rx, tasks).await
    }

    /// Accept connections until a message arrives on `shutdown_rx`.
    pub(crate) async fn serve_until(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
        mut tasks: JoinSet<()>,
    ) -> Result<(), Error> {
        for context in self.router.contexts() {
            info!("Mounted context {context}");
        }

        self.accept_until(&listener, &mut shutdown_rx, &mut tasks).await;
        self.perform_shutdown(&mut tasks).await;
        Ok(())
    }

    /// The accept loop. Finished connection tasks are reaped as they complete,
    /// so `tasks` only holds live connections.
    pub(crate) async fn accept_until(
        &self,
        listener: &TcpListener,
        shutdown_rx: &mut mpsc::Receiver<()>,
        tasks: &mut JoinSet<()>,
    ) {
        // Create a semaphore to limit concurrent connections
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                // Accept new connections
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, _addr)) => self.handle_new_connection(socket, &semaphore, tasks),
                        Err(e) => Self::handle_connection_error(e).await,
                    }
                }

                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {e}");
                    }
                }
            }
        }
    }
}
