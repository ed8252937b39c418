//! Player state and the deltas computed between successive versions of it
//! (spec §3, §4.D).
//!
//! A [`PlayerState`] is a value: every mutation is modeled as constructing
//! a new instance via the `with_*` methods below, never as an in-place
//! field write. This sidesteps torn reads without per-field locking — a
//! reader either sees a complete old instance or a complete new one,
//! published atomically by whoever holds the new `Arc`/clone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The per-player subset of room state: identity, presentation, position,
/// and a bookkeeping timestamp that is never synchronized to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: String,
    pub player_name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Server-assigned on every new instance. Bookkeeping only — never
    /// appears in a [`Delta`].
    pub last_update_time: i64,
}

impl PlayerState {
    pub fn new(player_id: impl Into<String>, player_name: impl Into<String>, color: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            player_id: player_id.into(),
            player_name: player_name.into(),
            color: color.into(),
            x,
            y,
            last_update_time: crate::now_millis(),
        }
    }

    /// A new instance with `x`/`y` replaced and a fresh timestamp.
    pub fn with_position(&self, x: f64, y: f64) -> Self {
        Self { x, y, last_update_time: crate::now_millis(), ..self.clone() }
    }

    /// A new instance with `color` replaced and a fresh timestamp.
    pub fn with_color(&self, color: impl Into<String>) -> Self {
        Self { color: color.into(), last_update_time: crate::now_millis(), ..self.clone() }
    }

    /// A new instance with `player_name` replaced and a fresh timestamp.
    pub fn with_name(&self, player_name: impl Into<String>) -> Self {
        Self { player_name: player_name.into(), last_update_time: crate::now_millis(), ..self.clone() }
    }

    /// The public, wire-facing projection of this state (no `last_update_time`).
    pub fn to_public_json(&self) -> Value {
        serde_json::json!({
            "playerId": self.player_id,
            "playerName": self.player_name,
            "color": self.color,
            "x": self.x,
            "y": self.y,
        })
    }
}

/// The minimal description of what changed between two successive
/// [`PlayerState`]s for one player, stamped with the room version at which
/// it took effect (spec §3, §GLOSSARY).
#[derive(Debug, Clone, Serialize)]
pub struct Delta {
    pub player_id: String,
    /// Field name (`x`, `y`, `color`, `player_name`) -> new value. Only
    /// fields that actually differ between old and new state are present.
    pub changes: BTreeMap<String, Value>,
    pub version: u64,
    pub timestamp: i64,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compute the [`Delta`] between `old` and `new`, per spec §4.D's
/// comparison rules:
///
/// - `x`, `y`: bit-exact float inequality. `NaN != NaN`, so a NaN on either
///   side is always reported as a change.
/// - `color`, `player_name`: codepoint-wise string inequality.
/// - `last_update_time` is never compared or included.
///
/// `version` is the version the room assigns to the transition that
/// produced this delta — the caller stamps it after incrementing the
/// room's counter, not here.
pub fn compute_delta(old: &PlayerState, new: &PlayerState, version: u64) -> Delta {
    let mut changes = BTreeMap::new();

    if old.x != new.x {
        changes.insert("x".to_string(), serde_json::json!(new.x));
    }
    if old.y != new.y {
        changes.insert("y".to_string(), serde_json::json!(new.y));
    }
    if old.color != new.color {
        changes.insert("color".to_string(), serde_json::json!(new.color));
    }
    if old.player_name != new.player_name {
        changes.insert("player_name".to_string(), serde_json::json!(new.player_name));
    }

    Delta {
        player_id: new.player_id.clone(),
        changes,
        version,
        timestamp: crate::now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> PlayerState {
        PlayerState::new("p1", "Alice", "#FF0000", 10.0, 20.0)
    }

    #[test]
    fn with_position_changes_only_position() {
        let a = player();
        let b = a.with_position(11.0, 20.0);
        assert_eq!(b.x, 11.0);
        assert_eq!(b.y, 20.0);
        assert_eq!(b.color, a.color);
        assert_eq!(b.player_name, a.player_name);
    }

    #[test]
    fn delta_contains_only_changed_fields() {
        let a = player();
        let b = a.with_position(11.0, 20.0);
        let delta = compute_delta(&a, &b, 3);
        assert_eq!(delta.changes.len(), 1);
        assert_eq!(delta.changes.get("x").unwrap(), &serde_json::json!(11.0));
        assert!(delta.changes.get("y").is_none());
    }

    #[test]
    fn identical_states_yield_empty_delta() {
        let a = player();
        let b = a.clone();
        let delta = compute_delta(&a, &b, 1);
        assert!(delta.is_empty());
    }

    #[test]
    fn nan_is_always_a_change() {
        let a = player();
        let b = a.with_position(f64::NAN, a.y);
        let delta = compute_delta(&a, &b, 1);
        assert!(delta.changes.contains_key("x"));

        // Even comparing NaN to NaN reports a change: NaN != NaN.
        let c = b.with_position(f64::NAN, b.y);
        let delta2 = compute_delta(&b, &c, 2);
        assert!(delta2.changes.contains_key("x"));
    }

    #[test]
    fn last_update_time_never_included() {
        let a = player();
        let mut b = a.with_name("Bob");
        b.last_update_time += 1000;
        let delta = compute_delta(&a, &b, 1);
        assert!(!delta.changes.contains_key("last_update_time"));
    }

    #[test]
    fn color_and_name_are_codepoint_comparisons() {
        let a = player();
        let b = a.with_color("#ff0000"); // different case, different codepoints
        let delta = compute_delta(&a, &b, 1);
        assert!(delta.changes.contains_key("color"));
    }
}
