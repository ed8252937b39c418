//! Server configuration (ambient; mirrors the teacher's `ServerConfig`).

use std::net::SocketAddr;
use std::time::Duration;

/// Tunables for the transport adapter. Every field has a default matching
/// the values spec.md names explicitly; only `bind_addr` has no sensible
/// default and must be supplied (typically built from the CLI's port
/// argument).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub bind_addr: SocketAddr,
    /// Connection closes if no inbound frame arrives within this window.
    pub idle_timeout: Duration,
    /// Write-idle is tolerated up to this long; recorded for documentation
    /// purposes only, not enforced (see the transport module's doc comment).
    pub write_idle_grace: Duration,
    /// Upper bound on how long the WebSocket upgrade handshake may take.
    pub handshake_timeout: Duration,
    /// Maximum accepted message size, in bytes.
    pub max_frame_bytes: usize,
}

impl SyncConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr, ..Self::default_tunables() }
    }

    fn default_tunables() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            idle_timeout: Duration::from_secs(60),
            write_idle_grace: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            max_frame_bytes: 65_536,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::default_tunables()
    }
}
