//! # Relay Server
//!
//! Owns the listening socket and one task per client connection.
//!
//! ## Lifecycle
//!
//! 1. [`RelayServer::start`] binds the listener. Failing to bind is the only
//!    error a caller ever sees.
//! 2. The accept loop spawns a connection task per TCP stream. Handshake
//!    failures, decode failures and write failures stay inside that task.
//! 3. [`RelayServer::shutdown`] stops accepting, lets every connection send
//!    a close frame within the grace period, then aborts whatever is left.
//!
//! Dropping a `RelayServer` without calling `shutdown` also stops it, just
//! without waiting for connections to wind down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use relay_config::RelaySettings;
use relay_core::{
    BroadcastReport, Broadcaster, ClientRegistry, ConnectionState, InboundMessage, RelayError,
    RelayResult, RemoteClientConnection,
};
use types::MessageEnvelope;

use crate::handler::{handle_connection, ConnectionContext};

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A running relay
pub struct RelayServer {
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    broadcaster: Broadcaster,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<ConnectionTasks>,
    shutdown_grace: Duration,
}

impl RelayServer {
    /// Bind the listener and start accepting clients.
    ///
    /// Inbound client messages are pushed into `inbound`, which normally
    /// feeds a [`ControlBridge`](crate::ControlBridge).
    pub async fn start(
        settings: &RelaySettings,
        registry: Arc<ClientRegistry>,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> RelayResult<Self> {
        let addr = settings
            .listen_addr()
            .map_err(|e| RelayError::Config(format!("{:#}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        info!("Relay listening on ws://{}", local_addr);

        let ctx = Arc::new(ConnectionContext {
            registry: registry.clone(),
            inbound,
            handshake_timeout: settings.handshake_timeout(),
            write_queue_capacity: settings.write_queue_capacity,
            ping_interval: settings.ping_interval(),
            shutdown_grace: settings.shutdown_grace(),
            max_message_bytes: settings.max_message_bytes,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, ctx, shutdown_rx));

        Ok(Self {
            local_addr,
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            shutdown_tx,
            accept_task,
            shutdown_grace: settings.shutdown_grace(),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Handle for broadcasting from other tasks
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Deliver `envelope` to every currently open client
    pub fn broadcast(&self, envelope: &MessageEnvelope) -> BroadcastReport {
        self.broadcaster.broadcast(envelope)
    }

    pub fn connected_clients(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting, close every client within the grace period, then
    /// force-close the rest
    pub async fn shutdown(self) {
        info!(
            "Shutting down relay on {} ({} clients)",
            self.local_addr,
            self.registry.len()
        );
        self.shutdown_tx.send_replace(true);

        let mut connections = match self.accept_task.await {
            Ok(connections) => connections,
            Err(e) => {
                error!("Accept loop ended abnormally: {}", e);
                ConnectionTasks::default()
            }
        };

        // Connection tasks run their own close handshake, bounded by the
        // same grace period; the extra slack covers scheduling.
        let deadline = self.shutdown_grace + Duration::from_millis(250);
        let drained = tokio::time::timeout(deadline, async {
            while let Some(joined) = connections.tasks.join_next().await {
                connections.reap(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} connections still open after {:?}, aborting",
                connections.tasks.len(),
                self.shutdown_grace
            );
            connections.abort_all().await;
        }

        for conn in self.registry.drain() {
            conn.mark_closed();
        }
        info!("Relay stopped");
    }
}

/// Connection tasks plus the connections they drive.
///
/// An aborted task never reaches its own teardown, so the connection is
/// kept here to be marked `Closed` on its behalf.
#[derive(Default)]
struct ConnectionTasks {
    tasks: JoinSet<()>,
    connections: Vec<Arc<RemoteClientConnection>>,
}

impl ConnectionTasks {
    fn spawn<F>(&mut self, conn: Arc<RemoteClientConnection>, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.connections.push(conn);
        self.tasks.spawn(task);
    }

    /// Account for one finished task
    fn reap(&mut self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Connection task panicked: {}", e);
            }
        }
        self.connections
            .retain(|conn| conn.state() != ConnectionState::Closed);
    }

    /// Abort every task still running and close its connection
    async fn abort_all(&mut self) {
        self.tasks.shutdown().await;
        for conn in self.connections.drain(..) {
            if conn.mark_closed() {
                debug!("Client {} ({}) closed by abort", conn.id(), conn.peer());
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectionTasks {
    let mut connections = ConnectionTasks::default();

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted TCP connection from {}", peer);
                    let (conn, outbound) =
                        RemoteClientConnection::new(peer, ctx.write_queue_capacity);
                    let conn = Arc::new(conn);
                    connections.spawn(
                        conn.clone(),
                        handle_connection(stream, conn, outbound, ctx.clone(), shutdown.clone()),
                    );
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = connections.tasks.join_next(), if !connections.tasks.is_empty() => {
                connections.reap(joined);
            }
        }
    }

    debug!("Accept loop stopped");
    connections
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn peer() -> SocketAddr {
        "127.0.0.1:46000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_abort_closes_connections_mid_teardown() {
        let registry = Arc::new(ClientRegistry::new());
        let (conn, _outbound) = RemoteClientConnection::new(peer(), 4);
        let conn = Arc::new(conn);
        assert!(registry.add(conn.clone()));

        // Task stalls after leaving the registry, before its own teardown ends
        let (removed_tx, removed_rx) = oneshot::channel();
        let mut connections = ConnectionTasks::default();
        let task_registry = registry.clone();
        let id = conn.id();
        connections.spawn(conn.clone(), async move {
            task_registry.remove(&id);
            let _ = removed_tx.send(());
            std::future::pending::<()>().await
        });

        removed_rx.await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(registry.is_empty());

        connections.abort_all().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(connections.connections.is_empty());
        assert!(connections.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_reap_forgets_closed_connections() {
        let mut connections = ConnectionTasks::default();
        let (done, _rx) = RemoteClientConnection::new(peer(), 4);
        let done = Arc::new(done);
        let (live, _rx2) = RemoteClientConnection::new(peer(), 4);
        let live = Arc::new(live);

        let finished = done.clone();
        connections.spawn(done.clone(), async move {
            finished.mark_closed();
        });
        connections.spawn(live.clone(), std::future::pending());

        let joined = connections.tasks.join_next().await.unwrap();
        connections.reap(joined);

        assert_eq!(connections.connections.len(), 1);
        assert_eq!(connections.connections[0].id(), live.id());

        connections.abort_all().await;
        assert_eq!(live.state(), ConnectionState::Closed);
    }
}
