//! Registry of live rooms, keyed by room id (spec §4.C).
//!
//! Generalizes the teacher's `MountRegistry`: a `Mount` is looked up by path
//! and created ahead of time by an operator; a `Room` is looked up — and, on
//! first reference, created — by whichever client names it first. There is
//! no "default room" fallback here, since room ids are caller-supplied, not
//! derived from a request URI.

use std::sync::Arc;

use dashmap::DashMap;

use crate::room::Room;

/// Lock-free concurrent map from room id to live [`Room`].
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { rooms: Arc::new(DashMap::new()) }
    }

    /// Look up a room without creating it.
    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// Look up a room, creating an empty one under `room_id` if absent.
    /// Atomic with respect to concurrent callers naming the same new room —
    /// exactly one `Room` is ever constructed per id (spec §4.C, §8
    /// invariant: room creation is idempotent).
    pub fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(room_id, "room created");
                Arc::new(Room::new(room_id))
            })
            .clone()
    }

    /// Remove `room_id` from the registry, but only if it is currently
    /// empty. Returns `true` if the room was removed. A room that gains a
    /// player between the caller's emptiness check and this call is not
    /// removed — the check-then-remove is itself atomic via `DashMap`'s
    /// entry API, so there is no window for that race.
    pub fn remove_if_empty(&self, room_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) if entry.get().is_empty() => {
                entry.remove();
                tracing::debug!(room_id, "room removed (empty)");
                true
            }
            _ => false,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
