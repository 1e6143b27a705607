//! Service configuration defaults
//!
//! Default values and constants used across ForensicVR services for
//! consistency.

/// Relay server defaults
pub mod relay {
    /// Well-known port rendering clients connect to
    pub const DEFAULT_PORT: u16 = 9090;

    /// Listen on all interfaces so headsets on the LAN can reach the relay
    pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

    /// Per-connection outbound queue depth. A client whose queue fills up is
    /// disconnected.
    pub const WRITE_QUEUE_CAPACITY: usize = 256;

    /// Inbound hand-off queue between receive loops and the control bridge
    pub const INBOUND_QUEUE_CAPACITY: usize = 1024;

    /// WebSocket upgrade must complete within this window (milliseconds)
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

    /// Graceful close budget on shutdown (milliseconds)
    pub const SHUTDOWN_GRACE_MS: u64 = 2_000;

    /// Keepalive ping interval (seconds, 0 disables)
    pub const PING_INTERVAL_SECS: u64 = 30;

    /// Largest accepted inbound message (bytes)
    pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
}

/// Catalogue HTTP service defaults
pub mod catalog {
    pub const DEFAULT_PORT: u16 = 3001;

    pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

    /// JSON body limit; records embed their photo as a data URL
    pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
}

/// Logging defaults
pub mod logging {
    pub const DEFAULT_LEVEL: &str = "info";
}
