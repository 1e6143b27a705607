//! Per-connection task: handshake, receive loop, writer, teardown

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tracing::{debug, info, warn};

use relay_core::{
    ClientRegistry, InboundMessage, OutboundFrame, RelayError, RelayResult, RemoteClientConnection,
};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Everything a connection task needs from the server
pub(crate) struct ConnectionContext {
    pub registry: Arc<ClientRegistry>,
    pub inbound: mpsc::Sender<InboundMessage>,
    pub handshake_timeout: Duration,
    pub write_queue_capacity: usize,
    pub ping_interval: Option<Duration>,
    pub shutdown_grace: Duration,
    pub max_message_bytes: usize,
}

/// Why a connection's loops stopped
#[derive(Debug)]
enum CloseReason {
    RemoteClosed,
    ReadFailed(String),
    WriteFailed(String),
    Evicted,
    Shutdown,
}

impl CloseReason {
    /// Close frame to send before dropping the socket, if the socket is
    /// still usable
    fn close_frame(&self) -> Option<CloseFrame<'static>> {
        match self {
            CloseReason::Evicted => Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "write queue overflow".into(),
            }),
            CloseReason::Shutdown => Some(CloseFrame {
                code: CloseCode::Away,
                reason: "relay shutting down".into(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::RemoteClosed => f.write_str("closed by client"),
            CloseReason::ReadFailed(e) => write!(f, "read error: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write error: {}", e),
            CloseReason::Evicted => f.write_str("evicted"),
            CloseReason::Shutdown => f.write_str("relay shutdown"),
        }
    }
}

/// Drive one accepted TCP stream from handshake to `Closed`
pub(crate) async fn handle_connection(
    stream: TcpStream,
    conn: Arc<RemoteClientConnection>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let peer = conn.peer();

    let ws = match handshake(stream, peer, &ctx).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("{}", e);
            conn.mark_closed();
            return;
        }
    };

    if !ctx.registry.add(conn.clone()) {
        warn!("Connection {} from {} could not be registered", conn.id(), peer);
        conn.mark_closed();
        return;
    }
    counter!("relay_connections_total").increment(1);
    info!("Client {} connected from {}", conn.id(), peer);

    let (mut sink, mut stream) = ws.split();

    let reason = tokio::select! {
        reason = read_loop(&mut stream, &conn, &ctx.inbound) => reason,
        reason = write_loop(&mut sink, &mut outbound, ctx.ping_interval) => reason,
        _ = conn.close_requested() => CloseReason::Evicted,
        _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => CloseReason::Shutdown,
    };

    // Single teardown path
    ctx.registry.remove(&conn.id());
    close_socket(&mut sink, &mut stream, &mut outbound, &reason, ctx.shutdown_grace).await;
    outbound.close();

    let abandoned = drain(&mut outbound);
    if abandoned > 0 {
        debug!("Abandoned {} queued frames for client {}", abandoned, conn.id());
    }

    if conn.mark_closed() {
        info!("Client {} ({}) disconnected: {}", conn.id(), peer, reason);
    }
}

async fn handshake(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> RelayResult<WebSocketStream<TcpStream>> {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(ctx.max_message_bytes);
    config.max_frame_size = Some(ctx.max_message_bytes);

    match timeout(ctx.handshake_timeout, accept_async_with_config(stream, Some(config))).await {
        Ok(Ok(ws)) => Ok(ws),
        Ok(Err(e)) => Err(RelayError::Handshake {
            peer,
            reason: e.to_string(),
        }),
        Err(_) => Err(RelayError::Handshake {
            peer,
            reason: format!("timed out after {:?}", ctx.handshake_timeout),
        }),
    }
}

/// Forward every data frame to the control bridge, in arrival order
async fn read_loop(
    stream: &mut WsStream,
    conn: &RemoteClientConnection,
    inbound: &mpsc::Sender<InboundMessage>,
) -> CloseReason {
    while let Some(frame) = stream.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => InboundMessage::from_text(conn.id(), conn.peer(), text),
            Ok(Message::Binary(bytes)) => {
                InboundMessage::from_binary(conn.id(), conn.peer(), bytes)
            }
            Ok(Message::Close(_)) => return CloseReason::RemoteClosed,
            // ping/pong answered by the protocol layer
            Ok(_) => continue,
            Err(e) => return CloseReason::ReadFailed(e.to_string()),
        };

        match decoded {
            Ok(message) => {
                counter!("relay_inbound_messages_total").increment(1);
                debug!("Inbound from {}: {} bytes", conn.id(), message.body.len());
                if inbound.send(message).await.is_err() {
                    debug!("Control bridge gone, dropping message from {}", conn.id());
                }
            }
            Err(e) => {
                counter!("relay_decode_failures_total").increment(1);
                warn!(
                    "Discarding message from client {}: {}",
                    conn.id(),
                    RelayError::from(e)
                );
            }
        }
    }
    CloseReason::RemoteClosed
}

/// Drain the outbound queue onto the socket and send keepalive pings
async fn write_loop(
    sink: &mut WsSink,
    outbound: &mut mpsc::Receiver<OutboundFrame>,
    ping_interval: Option<Duration>,
) -> CloseReason {
    let mut ping = ping_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                // The connection holds the sender, so the queue outlives this loop
                let Some(frame) = frame else {
                    return CloseReason::WriteFailed("outbound queue closed".into());
                };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    return CloseReason::WriteFailed(e.to_string());
                }
            }
            _ = next_tick(&mut ping) => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    return CloseReason::WriteFailed(e.to_string());
                }
            }
        }
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Best-effort close handshake, bounded by `grace`
async fn close_socket(
    sink: &mut WsSink,
    stream: &mut WsStream,
    outbound: &mut mpsc::Receiver<OutboundFrame>,
    reason: &CloseReason,
    grace: Duration,
) {
    if matches!(reason, CloseReason::WriteFailed(_) | CloseReason::ReadFailed(_)) {
        return;
    }

    let closing = async {
        if matches!(reason, CloseReason::Shutdown) {
            // Frames already accepted by broadcast still go out on shutdown
            while let Ok(frame) = outbound.try_recv() {
                sink.send(Message::Text(frame.to_string())).await?;
            }
        }
        match reason.close_frame() {
            Some(frame) => sink.send(Message::Close(Some(frame))).await?,
            // Flushes the protocol layer's reply to the client's close
            None => sink.close().await?,
        }
        // Wait for the peer to acknowledge
        while let Some(Ok(_)) = stream.next().await {}
        Ok::<_, tokio_tungstenite::tungstenite::Error>(())
    };

    match timeout(grace, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Close handshake failed: {}", e),
        Err(_) => debug!("Close handshake timed out after {:?}", grace),
    }
}

fn drain(outbound: &mut mpsc::Receiver<OutboundFrame>) -> usize {
    let mut count = 0;
    while outbound.try_recv().is_ok() {
        count += 1;
    }
    count
}
