//! The wire protocol (spec §6): one JSON object per text frame.
//!
//! ```text
//! { "type": ..., "roomId": ..., "playerId": ..., "payload": ..., "version": ..., "timestamp": ... }
//! ```
//!
//! Unknown fields on input are ignored (`serde`'s default behavior); `null`
//! fields are omitted on output (`skip_serializing_if`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message as it travels the wire, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(rename = "playerId", default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Inbound message kinds the handler understands (spec §6).
pub mod inbound {
    pub const JOIN_ROOM: &str = "JOIN_ROOM";
    pub const LEAVE_ROOM: &str = "LEAVE_ROOM";
    pub const STATE_UPDATE: &str = "STATE_UPDATE";
}

/// Outbound message kinds the handler produces (spec §6).
pub mod outbound {
    pub const FULL_STATE: &str = "FULL_STATE";
    pub const DELTA_UPDATE: &str = "DELTA_UPDATE";
    pub const PLAYER_JOINED: &str = "PLAYER_JOINED";
    pub const PLAYER_LEFT: &str = "PLAYER_LEFT";
    pub const ERROR: &str = "ERROR";
}

impl Message {
    /// Parse a raw inbound text frame. Returns `None` on JSON-parse failure
    /// or a missing/non-string `type` field — the caller maps that to
    /// [`crate::error::SyncError::MalformedMessage`].
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Serialize for transmission. Infallible: every field here is already
    /// JSON-representable.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).expect("Message always serializes")
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: outbound::ERROR.to_string(),
            room_id: None,
            player_id: None,
            payload: Some(serde_json::json!({ "message": text.into() })),
            version: None,
            timestamp: Some(crate::now_millis()),
        }
    }

    pub fn full_state(room_id: &str, players: Value, version: u64) -> Self {
        Self {
            kind: outbound::FULL_STATE.to_string(),
            room_id: Some(room_id.to_string()),
            player_id: None,
            payload: Some(serde_json::json!({ "players": players })),
            version: Some(version),
            timestamp: Some(crate::now_millis()),
        }
    }

    pub fn player_joined(room_id: &str, player_json: Value, version: u64) -> Self {
        Self {
            kind: outbound::PLAYER_JOINED.to_string(),
            room_id: Some(room_id.to_string()),
            player_id: player_json.get("playerId").and_then(|v| v.as_str()).map(String::from),
            payload: Some(player_json),
            version: Some(version),
            timestamp: Some(crate::now_millis()),
        }
    }

    pub fn player_left(room_id: &str, player_id: &str, player_name: &str, version: u64) -> Self {
        Self {
            kind: outbound::PLAYER_LEFT.to_string(),
            room_id: Some(room_id.to_string()),
            player_id: Some(player_id.to_string()),
            payload: Some(serde_json::json!({ "playerId": player_id, "playerName": player_name })),
            version: Some(version),
            timestamp: Some(crate::now_millis()),
        }
    }

    pub fn delta_update(room_id: &str, player_id: &str, changes: Value, version: u64) -> Self {
        Self {
            kind: outbound::DELTA_UPDATE.to_string(),
            room_id: Some(room_id.to_string()),
            player_id: Some(player_id.to_string()),
            payload: Some(serde_json::json!({ "players": { player_id: changes } })),
            version: Some(version),
            timestamp: Some(crate::now_millis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_shape() {
        let msg = Message {
            kind: "STATE_UPDATE".to_string(),
            room_id: Some("R".to_string()),
            player_id: Some("P".to_string()),
            payload: Some(serde_json::json!({ "x": 1.0, "y": 2.0 })),
            version: Some(7),
            timestamp: Some(1234),
        };
        let wire = msg.to_wire();
        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.kind, msg.kind);
        assert_eq!(parsed.room_id, msg.room_id);
        assert_eq!(parsed.player_id, msg.player_id);
        assert_eq!(parsed.version, msg.version);
        assert_eq!(parsed.payload, msg.payload);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{"type":"JOIN_ROOM","roomId":"R","bogus":"field"}"#;
        let parsed = Message::parse(raw).unwrap();
        assert_eq!(parsed.kind, "JOIN_ROOM");
    }

    #[test]
    fn missing_type_fails_to_parse() {
        let raw = r#"{"roomId":"R"}"#;
        assert!(Message::parse(raw).is_none());
    }

    #[test]
    fn invalid_json_fails_to_parse() {
        assert!(Message::parse("not valid json").is_none());
    }

    #[test]
    fn null_fields_are_omitted_on_output() {
        let msg = Message::error("bad input");
        let wire = msg.to_wire();
        assert!(!wire.contains("roomId"));
        assert!(!wire.contains("playerId"));
        assert!(!wire.contains("\"version\""));
    }
}
