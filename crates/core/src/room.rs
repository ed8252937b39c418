//! The room state engine (spec §4.D) — the hard part of this crate.
//!
//! Generalizes the teacher's `Mount`: where a `Mount` owned one
//! `Mutex<Box<dyn Packetizer>>` to serialize the single stateful operation
//! it needed (packetizing), a `Room` owns one `parking_lot::Mutex<()>` to
//! serialize every transition that writes more than one of its fields as a
//! unit — [`Room::add_player`]/[`Room::remove_player`]'s paired
//! `session_ids`/`players` inserts, and
//! [`Room::update_player_state`]'s read-old/compute-delta/write-new/
//! increment-version sequence. Plain reads of `players` or `session_ids`
//! stay lock-free and never contend with each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::player::{compute_delta, Delta, PlayerState};

/// A named container of mutually visible player states; the unit of
/// isolation and fan-out (spec §GLOSSARY).
pub struct Room {
    room_id: String,
    players: DashMap<String, PlayerState>,
    session_ids: DashMap<String, ()>,
    version: AtomicU64,
    created_at: i64,
    /// Guards every transition that touches more than one of
    /// `players`/`session_ids`/`version` as a unit: [`add_player`],
    /// [`remove_player`], and [`update_player_state`]. Never held across a
    /// read of `players` or `session_ids` elsewhere.
    update_lock: Mutex<()>,
    /// Monotonically increasing count of joins ever assigned by
    /// [`next_join_sequence`](Self::next_join_sequence), independent of how
    /// many players are currently present. Exists purely so the handler can
    /// pick a deterministic-modulo fallback color for a joining player
    /// without racing concurrent joiners over `player_count()`.
    join_sequence: AtomicU64,
}

impl Room {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            players: DashMap::new(),
            session_ids: DashMap::new(),
            version: AtomicU64::new(0),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0),
            update_lock: Mutex::new(()),
            join_sequence: AtomicU64::new(0),
        }
    }

    /// Atomically claim the next join-sequence number. Two concurrent
    /// callers always receive distinct values, unlike a read of
    /// `player_count()` taken before either has inserted its player.
    pub fn next_join_sequence(&self) -> u64 {
        self.join_sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.session_ids.is_empty()
    }

    pub fn get_player(&self, player_id: &str) -> Option<PlayerState> {
        self.players.get(player_id).map(|r| r.clone())
    }

    /// A read-only snapshot of every player currently in the room.
    pub fn get_all_players(&self) -> HashMap<String, PlayerState> {
        self.players
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// A read-only snapshot of resident session ids.
    pub fn get_session_ids(&self) -> Vec<String> {
        self.session_ids.iter().map(|r| r.key().clone()).collect()
    }

    /// Insert `session_id` into the resident set and `player_state` keyed
    /// by its `player_id`, incrementing `version`. Idempotent: re-adding an
    /// already-present session id overwrites the player record rather than
    /// duplicating it (spec §4.D: "the adapter prevents double-join under
    /// normal operation", but the engine tolerates it regardless).
    ///
    /// Debug-only: asserts `session_id == player_state.player_id`, per the
    /// spec's design note that session identity and player identity inside
    /// a room are the same thing by construction, not by accident.
    pub fn add_player(&self, session_id: &str, player_state: PlayerState) -> u64 {
        debug_assert_eq!(
            session_id, player_state.player_id,
            "session_id must equal player_id within a room"
        );
        // Both map writes and the version bump happen under `update_lock`
        // so a concurrent reader of `get_session_ids`/`get_all_players`
        // never observes the two maps out of lockstep (spec §3 invariant 1).
        let _guard = self.update_lock.lock();
        self.session_ids.insert(session_id.to_string(), ());
        self.players.insert(player_state.player_id.clone(), player_state);
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Remove both the session and its player record. Returns the removed
    /// state, or `None` if no such player existed — a "no action"
    /// indicator per spec §4.D's failure semantics, not an error. Version
    /// is incremented only when something was actually removed.
    pub fn remove_player(&self, session_id: &str, player_id: &str) -> Option<PlayerState> {
        debug_assert_eq!(session_id, player_id, "session_id must equal player_id within a room");
        let _guard = self.update_lock.lock();
        self.session_ids.remove(session_id);
        let removed = self.players.remove(player_id).map(|(_, v)| v);
        if removed.is_some() {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// The hot path (spec §4.D). Atomically:
    /// 1. reads the old state,
    /// 2. computes the delta,
    /// 3. installs the new state,
    /// 4. increments `version`,
    /// 5. stamps the delta with the resulting version.
    ///
    /// Returns `None` if no player exists under `player_id` (a "no action"
    /// indicator, not an error). The atomicity contract — no reader
    /// observes a version strictly ahead of the player instance it reads,
    /// and no two concurrent updates share a version — is provided by
    /// `update_lock`: every step above happens while it is held.
    pub fn update_player_state(&self, player_id: &str, new_state: PlayerState) -> Option<Delta> {
        let _guard = self.update_lock.lock();

        let old = self.players.get(player_id)?.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let delta = compute_delta(&old, &new_state, version);
        self.players.insert(player_id.to_string(), new_state);
        Some(delta)
    }
}
