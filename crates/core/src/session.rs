//! Connection-scoped session state (spec §3, §4.B).
//!
//! Generalizes the teacher's `Session`/`SessionManager`: where an RTSP
//! session tracks a playback state machine and negotiated transport
//! parameters, a sync session tracks room residency and presentation
//! (name/color) plus a non-blocking capability to push messages back down
//! its connection. The send capability is abstracted behind [`OutboundSink`]
//! so this module never depends on the transport's channel type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::message::Message;

/// Whatever the transport uses to deliver outbound messages to a
/// connection, abstracted so the engine never sees a channel type. Must
/// not block: per spec §5, the send sink is non-blocking by design — a
/// slow reader degrades to dropped messages, never to a stalled room.
pub trait OutboundSink: Send + Sync {
    /// Attempt to deliver `message`. Returns `false` if the sink could not
    /// accept it (closed, full, or otherwise unable) — the caller treats
    /// this as a skip, never as a fatal error (spec §7, `TransportFault`).
    fn try_send(&self, message: &Message) -> bool;
}

/// One live client connection (spec §3).
pub struct Session {
    pub session_id: String,
    sink: Arc<dyn OutboundSink>,
    current_room_id: RwLock<Option<String>>,
    player_name: RwLock<String>,
    player_color: RwLock<String>,
    connected_at: i64,
    active: AtomicBool,
}

impl Session {
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn OutboundSink>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
            current_room_id: RwLock::new(None),
            player_name: RwLock::new(String::new()),
            player_color: RwLock::new(String::new()),
            connected_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
            active: AtomicBool::new(true),
        }
    }

    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    pub fn current_room_id(&self) -> Option<String> {
        self.current_room_id.read().clone()
    }

    pub fn set_current_room_id(&self, room_id: Option<String>) {
        *self.current_room_id.write() = room_id;
    }

    pub fn player_name(&self) -> String {
        self.player_name.read().clone()
    }

    pub fn set_player_name(&self, name: impl Into<String>) {
        *self.player_name.write() = name.into();
    }

    pub fn player_color(&self) -> String {
        self.player_color.read().clone()
    }

    pub fn set_player_color(&self, color: impl Into<String>) {
        *self.player_color.write() = color.into();
    }

    /// Whether this session is still eligible to receive traffic. Set to
    /// `false` exactly once, at disconnect (spec §4.E: a session removed
    /// from the registry is never resurrected).
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Forward `message` to this session's connection. A `false` return
    /// (sink rejected it) is logged by the caller, never escalated.
    pub fn send(&self, message: &Message) -> bool {
        self.sink.try_send(message)
    }
}

/// Registry of live sessions, indexed two ways: by the transport's
/// connection identifier (spec calls this "conn"; here, whatever opaque
/// string the transport assigns a socket) and by `session_id` (spec
/// §4.B). Mirrors the teacher's `SessionManager`, upgraded from a single
/// `RwLock<HashMap>` to two `DashMap`s for lock-free concurrent reads on
/// both indices, per the pack's convention for this role.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    by_conn: Arc<DashMap<String, Arc<Session>>>,
    by_id: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { by_conn: Arc::new(DashMap::new()), by_id: Arc::new(DashMap::new()) }
    }

    /// Mint a fresh UUID v4 session id, register the session under both
    /// indices, and return it (spec §4.B `create`).
    pub fn create(&self, conn_id: impl Into<String>, sink: Arc<dyn OutboundSink>) -> Arc<Session> {
        let conn_id = conn_id.into();
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(session_id.clone(), sink));
        self.by_conn.insert(conn_id, session.clone());
        self.by_id.insert(session_id.clone(), session.clone());
        tracing::info!(session_id, total = self.by_id.len(), "session connected");
        session
    }

    /// Remove a session from both indices by its connection id (spec §4.B
    /// `remove`, invoked from the disconnect path).
    pub fn remove(&self, conn_id: &str) -> Option<Arc<Session>> {
        let session = self.by_conn.remove(conn_id).map(|(_, s)| s)?;
        session.deactivate();
        self.by_id.remove(&session.session_id);
        tracing::info!(session_id = %session.session_id, total = self.by_id.len(), "session disconnected");
        Some(session)
    }

    pub fn get_by_conn(&self, conn_id: &str) -> Option<Arc<Session>> {
        self.by_conn.get(conn_id).map(|r| r.clone())
    }

    pub fn get_by_id(&self, session_id: &str) -> Option<Arc<Session>> {
        self.by_id.get(session_id).map(|r| r.clone())
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}
