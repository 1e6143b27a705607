//! # Remote Client Connection
//!
//! One rendering client attached to the relay. The connection is an explicit
//! state machine:
//!
//! ```text
//! Connecting ──handshake ok──▶ Open ──remove──▶ Closing ──teardown──▶ Closed
//!      │                                                              ▲
//!      └──────────────────────handshake failed────────────────────────┘
//! ```
//!
//! - `Connecting → Open` happens only inside [`ClientRegistry::add`]
//! - `Open → Closing` happens only inside [`ClientRegistry::remove`]
//! - `→ Closed` happens once, through [`RemoteClientConnection::mark_closed`]
//!
//! Keeping the first two transitions under the registry lock is what makes
//! registry membership equal to the set of `Open` connections.
//!
//! Each connection owns a bounded outbound queue. Broadcast pushes into it
//! with `try_send`; the connection's writer task drains it onto the socket.
//!
//! [`ClientRegistry::add`]: crate::registry::ClientRegistry::add
//! [`ClientRegistry::remove`]: crate::registry::ClientRegistry::remove

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

/// Unique identifier for client connections
pub type ConnectionId = Uuid;

/// Encoded envelope shared by every recipient of one broadcast
pub type OutboundFrame = Arc<str>;

/// Lifecycle state of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A connected rendering client
pub struct RemoteClientConnection {
    id: ConnectionId,
    peer: SocketAddr,
    state: AtomicU8,
    outbound: mpsc::Sender<OutboundFrame>,
    capacity: usize,
    close_requested: watch::Sender<bool>,
    closed_once: AtomicBool,
    frames_queued: AtomicU64,
}

impl RemoteClientConnection {
    /// Create a connection in `Connecting` state together with the receiving
    /// end of its outbound queue
    pub fn new(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let capacity = capacity.max(1);
        let (outbound, rx) = mpsc::channel(capacity);
        let (close_requested, _) = watch::channel(false);

        let connection = Self {
            id: Uuid::new_v4(),
            peer,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound,
            capacity,
            close_requested,
            closed_once: AtomicBool::new(false),
            frames_queued: AtomicU64::new(0),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Frames successfully handed to this connection's queue
    pub fn frames_queued(&self) -> u64 {
        self.frames_queued.load(Ordering::Relaxed)
    }

    /// Push a frame without waiting. A full queue or a queue whose writer has
    /// gone away is reported so the caller can evict this connection.
    pub fn enqueue(&self, frame: OutboundFrame) -> RelayResult<()> {
        match self.outbound.try_send(frame) {
            Ok(()) => {
                let _ = self.frames_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(RelayError::QueueFull {
                id: self.id,
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RelayError::Write {
                id: self.id,
                reason: "outbound queue closed".to_string(),
            }),
        }
    }

    /// Ask the connection's task to close. Safe to call any number of times.
    pub fn request_close(&self) {
        self.close_requested.send_replace(true);
    }

    pub fn is_close_requested(&self) -> bool {
        *self.close_requested.borrow()
    }

    /// Resolves once [`request_close`](Self::request_close) has been called
    pub async fn close_requested(&self) {
        let mut rx = self.close_requested.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Terminal transition. Returns `true` for the first caller only.
    pub fn mark_closed(&self) -> bool {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        !self.closed_once.swap(true, Ordering::AcqRel)
    }

    /// Compare-and-set state transition; `false` if the current state was not
    /// `from`
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for RemoteClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClientConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("capacity", &self.capacity)
            .finish()
    }
}
