//! # roomsync — real-time room state synchronization over WebSocket
//!
//! A library for keeping many clients' view of a shared "room" of
//! player-shaped state in sync: joins, leaves, and incremental position/
//! presentation updates, fanned out to every other resident with a
//! monotonically increasing per-room version number.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Transport   — axum WebSocket upgrade,   │
//! │                one task per connection   │
//! ├──────────────────────────────────────────┤
//! │  Handler     — message routing, fan-out  │
//! ├──────────────────────────────────────────┤
//! │  SessionRegistry   — live connections     │
//! │  RoomRegistry      — live rooms           │
//! ├──────────────────────────────────────────┤
//! │  Room        — players, version, deltas  │
//! │  PlayerState — the value being synced    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Crate layout
//!
//! - [`room`] — [`Room`], the state engine: players, versioning, deltas.
//! - [`room_registry`] — [`RoomRegistry`], looked-up-or-created by id.
//! - [`session`] — [`Session`] and [`SessionRegistry`], one per connection.
//! - [`session_init`] — initial position/color assignment for new joiners.
//! - [`handler`] — [`MessageHandler`], the routing table and broadcast logic.
//! - [`message`] — the wire protocol (`Message`, in/outbound kind constants).
//! - [`player`] — [`PlayerState`] and [`Delta`] computation.
//! - [`config`] — [`SyncConfig`] tunables.
//! - [`transport`] — the `axum`/`tokio` WebSocket adapter.
//! - [`error`] — [`SyncError`] and [`Result`] alias.

pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod player;
pub mod room;
pub mod room_registry;
pub mod session;
pub mod session_init;
pub mod transport;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use handler::MessageHandler;
pub use message::Message;
pub use player::{Delta, PlayerState};
pub use room::Room;
pub use room_registry::RoomRegistry;
pub use session::{Session, SessionRegistry};

/// Milliseconds since the Unix epoch. Used to stamp [`PlayerState`] and
/// [`Message`] timestamps; saturates to `0` if the system clock is set
/// before the epoch, which never happens on any real deployment target.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
