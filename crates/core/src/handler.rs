//! Message routing for a single connection (spec §4.E).
//!
//! Generalizes the teacher's `MethodHandler`: instead of matching an RTSP
//! method against a fixed verb set, this matches the wire message's `type`
//! field against `JOIN_ROOM` / `LEAVE_ROOM` / `STATE_UPDATE` and applies
//! the same per-connection-state-plus-shared-registries shape.

use std::sync::Arc;

use crate::error::PreconditionKind;
use crate::message::{inbound, Message};
use crate::player::PlayerState;
use crate::room_registry::RoomRegistry;
use crate::session::{Session, SessionRegistry};
use crate::session_init::{palette_color, PositionSource, RandomPositionSource};

/// Routes inbound wire messages for one connection and performs the
/// broadcast fan-out their effects require.
///
/// One `MessageHandler` is constructed per connection (mirroring the
/// teacher's one-`MethodHandler`-per-TCP-connection lifetime) and is not
/// `Send` across connections; the registries it holds are cheap `Clone`s
/// of shared, thread-safe handles.
pub struct MessageHandler {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    position_source: Arc<dyn PositionSource>,
}

impl MessageHandler {
    pub fn new(sessions: SessionRegistry, rooms: RoomRegistry) -> Self {
        Self { sessions, rooms, position_source: Arc::new(RandomPositionSource::new()) }
    }

    /// Override the default random position source — used by tests that
    /// need deterministic starting coordinates (spec §9, Open Question 1).
    pub fn with_position_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.position_source = source;
        self
    }

    /// Parse and route one inbound text frame from `session`. A parse
    /// failure or unrecognized `type` produces an `ERROR` reply to the
    /// sender only — it never touches room state and is never escalated
    /// (spec §7: "never crashes on client-induced input").
    pub fn handle_message(&self, session: &Arc<Session>, raw: &str) {
        let message = match Message::parse(raw) {
            Some(m) => m,
            None => {
                tracing::warn!(session_id = %session.session_id, "malformed message");
                session.send(&Message::error("malformed message"));
                return;
            }
        };

        match message.kind.as_str() {
            inbound::JOIN_ROOM => self.handle_join(session, message),
            inbound::LEAVE_ROOM => self.handle_leave(session, message),
            inbound::STATE_UPDATE => self.handle_state_update(session, message),
            other => {
                tracing::warn!(session_id = %session.session_id, kind = other, "unknown message type");
                session.send(&Message::error(format!("unknown message type: {other}")));
            }
        }
    }

    fn handle_join(&self, session: &Arc<Session>, message: Message) {
        let room_id = match message.room_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                tracing::warn!(session_id = %session.session_id, "JOIN_ROOM with empty roomId");
                session.send(&Message::error(PreconditionKind::EmptyRoomId.to_string()));
                return;
            }
        };

        // A second JOIN_ROOM on the same connection implicitly leaves
        // whatever room it currently occupies first (spec §4.E).
        if let Some(previous_room_id) = session.current_room_id() {
            self.leave_current_room(session, &previous_room_id);
        }

        let room = self.rooms.get_or_create(&room_id);

        let requested_name =
            message.payload.as_ref().and_then(|p| p.get("playerName")).and_then(|v| v.as_str());
        let requested_color =
            message.payload.as_ref().and_then(|p| p.get("color")).and_then(|v| v.as_str());

        let player_name = requested_name.map(str::to_string).unwrap_or_else(|| {
            format!("Player-{}", &session.session_id[..8.min(session.session_id.len())])
        });
        let color = requested_color.map(str::to_string).unwrap_or_else(|| {
            // Claimed atomically so two concurrent first-time joiners to a
            // brand-new room can never read the same fallback index.
            palette_color(room.next_join_sequence() as usize).to_string()
        });
        let (x, y) = self.position_source.next_position();

        session.set_current_room_id(Some(room_id.clone()));
        session.set_player_name(player_name.clone());
        session.set_player_color(color.clone());

        let player = PlayerState::new(session.session_id.clone(), player_name, color, x, y);
        let version = room.add_player(&session.session_id, player.clone());

        tracing::info!(session_id = %session.session_id, room_id, version, "player joined room");

        let snapshot = room.get_all_players();
        let players_json: serde_json::Value = snapshot
            .iter()
            .map(|(player_id, state)| (player_id.clone(), state.to_public_json()))
            .collect::<serde_json::Map<_, _>>()
            .into();
        session.send(&Message::full_state(&room_id, players_json, version));

        self.broadcast_except(&room_id, &session.session_id, &Message::player_joined(&room_id, player.to_public_json(), version));
    }

    fn handle_leave(&self, session: &Arc<Session>, _message: Message) {
        let room_id = match session.current_room_id() {
            Some(id) => id,
            None => {
                tracing::warn!(session_id = %session.session_id, "LEAVE_ROOM while not in a room");
                session.send(&Message::error(PreconditionKind::NotInRoom.to_string()));
                return;
            }
        };

        self.leave_current_room(session, &room_id);
    }

    fn handle_state_update(&self, session: &Arc<Session>, message: Message) {
        let room_id = match session.current_room_id() {
            Some(id) => id,
            None => {
                tracing::warn!(session_id = %session.session_id, "STATE_UPDATE while not in a room");
                session.send(&Message::error(PreconditionKind::NotInRoom.to_string()));
                return;
            }
        };

        let room = match self.rooms.get(&room_id) {
            Some(r) => r,
            None => {
                tracing::warn!(session_id = %session.session_id, room_id, "STATE_UPDATE for a room that no longer exists");
                session.send(&Message::error(PreconditionKind::NoPlayerRecord.to_string()));
                return;
            }
        };

        let current = match room.get_player(&session.session_id) {
            Some(p) => p,
            None => {
                tracing::warn!(session_id = %session.session_id, room_id, "STATE_UPDATE with no player record");
                session.send(&Message::error(PreconditionKind::NoPlayerRecord.to_string()));
                return;
            }
        };

        // Only x/y are overlaid here (spec §4.E): STATE_UPDATE carries
        // motion, not presentation changes. Fields absent from the
        // payload retain their current value.
        let payload = message.payload.unwrap_or_default();
        let x = payload.get("x").and_then(|v| v.as_f64()).unwrap_or(current.x);
        let y = payload.get("y").and_then(|v| v.as_f64()).unwrap_or(current.y);
        let next = current.with_position(x, y);

        let delta = match room.update_player_state(&session.session_id, next) {
            Some(d) => d,
            None => return,
        };

        if delta.is_empty() {
            tracing::debug!(session_id = %session.session_id, room_id, "no-op STATE_UPDATE");
            return;
        }

        tracing::debug!(session_id = %session.session_id, room_id, version = delta.version, "state updated");

        let changes_json = serde_json::to_value(&delta.changes).unwrap_or_default();
        self.broadcast_except(
            &room_id,
            &session.session_id,
            &Message::delta_update(&room_id, &session.session_id, changes_json, delta.version),
        );
    }

    /// The disconnect path (spec §4.E): remove the session's player record
    /// from whatever room it occupied, broadcast `PLAYER_LEFT`, and clean
    /// up an emptied room. Idempotent: a session with no current room is a
    /// no-op, since disconnect can race with an explicit `LEAVE_ROOM`.
    pub fn handle_disconnect(&self, session: &Arc<Session>) {
        if let Some(room_id) = session.current_room_id() {
            self.leave_current_room(session, &room_id);
        }
    }

    fn leave_current_room(&self, session: &Arc<Session>, room_id: &str) {
        // Clear residency unconditionally, before the room lookup: if the
        // room was concurrently GC'd by `RoomRegistry::remove_if_empty`,
        // the session must not be left pointing at a room that no longer
        // exists, or every future LEAVE_ROOM on it would silently no-op.
        session.set_current_room_id(None);

        let room = match self.rooms.get(room_id) {
            Some(r) => r,
            None => return,
        };

        let player_name = room.get_player(&session.session_id).map(|p| p.player_name);
        let removed = room.remove_player(&session.session_id, &session.session_id);

        if let Some(player) = removed {
            let player_name = player_name.unwrap_or(player.player_name);
            tracing::info!(session_id = %session.session_id, room_id, "player left room");
            self.broadcast_except(
                room_id,
                &session.session_id,
                &Message::player_left(room_id, &session.session_id, &player_name, room.version()),
            );
        }

        self.rooms.remove_if_empty(room_id);
    }

    /// Deliver `message` to every session resident in `room_id` except
    /// `exclude_session_id`. Per spec §4.E, fan-out never aborts on a
    /// single delivery failure — a session whose sink rejects the
    /// message, or whose entry has vanished from the registry, is just
    /// skipped.
    fn broadcast_except(&self, room_id: &str, exclude_session_id: &str, message: &Message) {
        self.broadcast_filtered(room_id, Some(exclude_session_id), message);
    }

    fn broadcast_filtered(&self, room_id: &str, exclude_session_id: Option<&str>, message: &Message) {
        let Some(room) = self.rooms.get(room_id) else { return };
        for session_id in room.get_session_ids() {
            if Some(session_id.as_str()) == exclude_session_id {
                continue;
            }
            match self.sessions.get_by_id(&session_id) {
                Some(session) if session.is_active() => {
                    if !session.send(message) {
                        tracing::warn!(session_id, room_id, "dropped broadcast message: sink unavailable");
                    }
                }
                _ => tracing::warn!(session_id, room_id, "dropped broadcast message: session absent or inactive"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutboundSink;
    use crate::session_init::FixedPositionSource;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<Message>>);

    impl RecordingSink {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
        fn kinds(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|m| m.kind.clone()).collect()
        }
    }

    impl OutboundSink for RecordingSink {
        fn try_send(&self, message: &Message) -> bool {
            self.0.lock().unwrap().push(message.clone());
            true
        }
    }

    fn setup() -> (MessageHandler, SessionRegistry, RoomRegistry) {
        let sessions = SessionRegistry::new();
        let rooms = RoomRegistry::new();
        let handler = MessageHandler::new(sessions.clone(), rooms.clone())
            .with_position_source(Arc::new(FixedPositionSource::new(vec![(0.0, 0.0)])));
        (handler, sessions, rooms)
    }

    #[test]
    fn join_room_creates_room_and_replies_full_state() {
        let (handler, sessions, rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink.clone());

        handler.handle_message(&session, r#"{"type":"JOIN_ROOM","roomId":"R1","payload":{"playerName":"Alice"}}"#);

        assert_eq!(rooms.get("R1").unwrap().player_count(), 1);
        assert_eq!(sink.kinds(), vec!["FULL_STATE"]);
        assert_eq!(session.current_room_id(), Some("R1".to_string()));
    }

    #[test]
    fn second_joiner_receives_full_state_and_first_receives_player_joined() {
        let (handler, sessions, _rooms) = setup();
        let sink_a = Arc::new(RecordingSink::new());
        let session_a = sessions.create("c1", sink_a.clone());
        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let sink_b = Arc::new(RecordingSink::new());
        let session_b = sessions.create("c2", sink_b.clone());
        handler.handle_message(&session_b, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        assert_eq!(sink_b.kinds(), vec!["FULL_STATE"]);
        assert_eq!(sink_a.kinds(), vec!["PLAYER_JOINED"]);
    }

    #[test]
    fn join_room_with_empty_room_id_errors_without_side_effects() {
        let (handler, _sessions, rooms) = setup();
        let sessions = SessionRegistry::new();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink.clone());

        handler.handle_message(&session, r#"{"type":"JOIN_ROOM","roomId":""}"#);

        assert_eq!(sink.kinds(), vec!["ERROR"]);
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn state_update_without_join_errors() {
        let (handler, sessions, _rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink.clone());

        handler.handle_message(&session, r#"{"type":"STATE_UPDATE","payload":{"x":1.0,"y":2.0}}"#);

        assert_eq!(sink.kinds(), vec!["ERROR"]);
    }

    #[test]
    fn state_update_broadcasts_delta_to_others_but_not_the_sender() {
        let (handler, sessions, _rooms) = setup();
        let sink_a = Arc::new(RecordingSink::new());
        let session_a = sessions.create("c1", sink_a.clone());
        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let sink_b = Arc::new(RecordingSink::new());
        let session_b = sessions.create("c2", sink_b.clone());
        handler.handle_message(&session_b, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        handler.handle_message(&session_a, r#"{"type":"STATE_UPDATE","payload":{"x":9.0,"y":9.0}}"#);

        assert_eq!(sink_a.kinds(), vec!["PLAYER_JOINED"]);
        assert_eq!(sink_b.kinds(), vec!["FULL_STATE", "DELTA_UPDATE"]);
    }

    #[test]
    fn no_op_state_update_broadcasts_nothing() {
        let (handler, sessions, rooms) = setup();
        let sink_a = Arc::new(RecordingSink::new());
        let session_a = sessions.create("c1", sink_a.clone());
        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let sink_b = Arc::new(RecordingSink::new());
        let session_b = sessions.create("c2", sink_b.clone());
        handler.handle_message(&session_b, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let version_before = rooms.get("R1").unwrap().version();
        handler.handle_message(&session_a, r#"{"type":"STATE_UPDATE","payload":{}}"#);

        assert_eq!(sink_b.kinds(), vec!["FULL_STATE"]);
        assert_eq!(rooms.get("R1").unwrap().version(), version_before);
    }

    #[test]
    fn rejoining_implicitly_leaves_the_previous_room() {
        let (handler, sessions, rooms) = setup();
        let sink_a = Arc::new(RecordingSink::new());
        let session_a = sessions.create("c1", sink_a.clone());
        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let sink_b = Arc::new(RecordingSink::new());
        let session_b = sessions.create("c2", sink_b.clone());
        handler.handle_message(&session_b, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R2"}"#);

        assert_eq!(session_a.current_room_id(), Some("R2".to_string()));
        assert_eq!(rooms.get("R1").unwrap().player_count(), 1);
        assert!(sink_b.kinds().contains(&"PLAYER_LEFT".to_string()));
    }

    #[test]
    fn default_player_name_uses_session_id_prefix() {
        let (handler, sessions, rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink);
        handler.handle_message(&session, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let player = rooms.get("R1").unwrap().get_player(&session.session_id).unwrap();
        assert_eq!(player.player_name, format!("Player-{}", &session.session_id[..8]));
    }

    #[test]
    fn disconnect_removes_player_and_broadcasts_player_left() {
        let (handler, sessions, rooms) = setup();
        let sink_a = Arc::new(RecordingSink::new());
        let session_a = sessions.create("c1", sink_a.clone());
        handler.handle_message(&session_a, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        let sink_b = Arc::new(RecordingSink::new());
        let session_b = sessions.create("c2", sink_b.clone());
        handler.handle_message(&session_b, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        handler.handle_disconnect(&session_a);

        assert_eq!(sink_b.kinds(), vec!["FULL_STATE", "PLAYER_LEFT"]);
        assert_eq!(rooms.get("R1").unwrap().player_count(), 1);
    }

    #[test]
    fn disconnect_of_last_player_removes_the_room() {
        let (handler, sessions, rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink);
        handler.handle_message(&session, r#"{"type":"JOIN_ROOM","roomId":"R1"}"#);

        handler.handle_disconnect(&session);

        assert!(rooms.get("R1").is_none());
    }

    #[test]
    fn disconnect_without_a_room_is_a_no_op() {
        let (handler, sessions, _rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink);
        handler.handle_disconnect(&session);
    }

    #[test]
    fn unknown_message_type_errors() {
        let (handler, sessions, _rooms) = setup();
        let sink = Arc::new(RecordingSink::new());
        let session = sessions.create("c1", sink.clone());
        handler.handle_message(&session, r#"{"type":"BOGUS"}"#);
        assert_eq!(sink.kinds(), vec!["ERROR"]);
    }
}
