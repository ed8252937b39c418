//! Error types for the room-synchronization engine.

use std::fmt;

/// Errors that can occur in the engine.
///
/// Variants map to the failure taxonomy of the wire protocol:
///
/// - **Protocol**: [`MalformedMessage`](Self::MalformedMessage),
///   [`UnknownMessageType`](Self::UnknownMessageType) — bad client input,
///   always recovered locally and reported to the sender as `ERROR`.
/// - **Precondition**: [`PreconditionViolation`](Self::PreconditionViolation)
///   — a message arrived while the session wasn't in the state it requires.
/// - **Server**: [`BindFailed`](Self::BindFailed) — the one fatal error,
///   surfaced by the CLI at startup.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The frame was not valid JSON, or was valid JSON missing `type`.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// `type` was present and well-formed but not a recognized message kind.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A message's preconditions weren't met (e.g. `STATE_UPDATE` while not
    /// in any room). Not raised — only ever produced to render an `ERROR`
    /// reply; see [`PreconditionKind`].
    #[error("precondition violation: {0}")]
    PreconditionViolation(PreconditionKind),

    /// Listen-socket bind failure at startup. The only error kind this
    /// crate treats as fatal; everything else is recovered per-connection.
    #[error("failed to bind listener: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Specific kind of precondition failure, used to build the `ERROR`
/// message's human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionKind {
    /// `JOIN_ROOM` with an empty or missing `roomId`.
    EmptyRoomId,
    /// `STATE_UPDATE` or `LEAVE_ROOM` sent while not resident in any room.
    NotInRoom,
    /// `STATE_UPDATE` from a session with no player record in its room.
    NoPlayerRecord,
}

impl fmt::Display for PreconditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRoomId => write!(f, "roomId must be non-empty"),
            Self::NotInRoom => write!(f, "not currently in a room"),
            Self::NoPlayerRecord => write!(f, "no player record for this session"),
        }
    }
}

/// Convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;
