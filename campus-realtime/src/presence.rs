//! Presence aggregation for a single channel.
//!
//! ## State machine
//!
//! ```text
//!  Disconnected ──subscribe()──► Subscribing ──Subscribed──► Synced
//!       ▲                                                      │
//!       └──────────────── disconnect / unsubscribe ────────────┘
//! ```
//!
//! While `Synced`:
//! - a *sync* snapshot replaces the whole map,
//! - a *diff* adds (`joins`) and removes (`leaves`) individual keys.
//!
//! Local `track` calls and what remote observers see are only eventually
//! consistent. Nothing here orders the two.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// Pointer position in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f32,
    pub y: f32,
}

/// What a connection publishes about its user.
///
/// The presence key (the connection key) is not part of the record; it is
/// the key of the map that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub display_name: String,
    /// CSS color string, e.g. `#4ECDC4`.
    pub color: String,
    pub cursor: Option<Cursor>,
}

impl PresenceRecord {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            color: color.into(),
            cursor: None,
        }
    }

    /// Copy of this record with `cursor` replaced.
    pub fn with_cursor(&self, x: f32, y: f32) -> Self {
        Self {
            cursor: Some(Cursor { x, y }),
            ..self.clone()
        }
    }
}

/// Incremental presence change. Joins are applied before leaves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    pub joins: HashMap<String, PresenceRecord>,
    pub leaves: HashMap<String, PresenceRecord>,
}

impl PresenceDiff {
    pub fn join(key: impl Into<String>, record: PresenceRecord) -> Self {
        let mut diff = Self::default();
        diff.joins.insert(key.into(), record);
        diff
    }

    pub fn leave(key: impl Into<String>, record: PresenceRecord) -> Self {
        let mut diff = Self::default();
        diff.leaves.insert(key.into(), record);
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────────
// Colors
// ───────────────────────────────────────────────────────────────────

/// Fixed cursor palette. Not guaranteed unique across concurrent users.
pub const PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// Random palette entry, drawn once per mount.
pub fn pick_color() -> &'static str {
    let index = (Uuid::new_v4().as_u128() % PALETTE.len() as u128) as usize;
    PALETTE[index]
}

// ───────────────────────────────────────────────────────────────────
// Aggregated state
// ───────────────────────────────────────────────────────────────────

/// Connection key → last-known record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    entries: HashMap<String, PresenceRecord>,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with the authoritative snapshot.
    pub fn apply_sync(&mut self, snapshot: HashMap<String, PresenceRecord>) {
        self.entries = snapshot;
    }

    /// Insert or overwrite one key.
    pub fn apply_join(&mut self, key: impl Into<String>, record: PresenceRecord) {
        self.entries.insert(key.into(), record);
    }

    /// Remove one key. Unknown keys are ignored.
    pub fn apply_leave(&mut self, key: &str) -> Option<PresenceRecord> {
        self.entries.remove(key)
    }

    pub fn apply_diff(&mut self, diff: &PresenceDiff) {
        for (key, record) in &diff.joins {
            self.apply_join(key.clone(), record.clone());
        }
        for key in diff.leaves.keys() {
            self.apply_leave(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<&PresenceRecord> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PresenceRecord)> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> HashMap<String, PresenceRecord> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ───────────────────────────────────────────────────────────────────
// Per-channel tracker
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresencePhase {
    Disconnected,
    Subscribing,
    Synced,
}

/// Who the local user is, as far as presence cares.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Drives the presence state machine for one channel binding.
///
/// Pure state: the caller sends whatever record the tracker hands back.
#[derive(Debug)]
pub struct PresenceTracker {
    phase: PresencePhase,
    state: PresenceState,
    /// `None` when the identity lookup failed; tracking is skipped.
    identity: Option<LocalIdentity>,
    /// Last record this side published.
    local: Option<PresenceRecord>,
    cursors: bool,
}

impl PresenceTracker {
    pub fn new(identity: Option<LocalIdentity>, cursors: bool) -> Self {
        Self {
            phase: PresencePhase::Disconnected,
            state: PresenceState::new(),
            identity,
            local: None,
            cursors,
        }
    }

    pub fn begin_subscribe(&mut self) {
        self.phase = PresencePhase::Subscribing;
    }

    /// Subscription confirmed. Returns the record to track, if any.
    pub fn on_subscribed(&mut self) -> Option<PresenceRecord> {
        self.phase = PresencePhase::Synced;

        let Some(identity) = &self.identity else {
            log::debug!("No local identity; skipping presence tracking");
            return None;
        };

        let record = PresenceRecord::new(
            identity.user_id.clone(),
            identity.display_name.clone(),
            pick_color(),
        );
        self.local = Some(record.clone());
        Some(record)
    }

    /// Returns `false` when dropped because the channel is not synced.
    pub fn on_sync(&mut self, snapshot: HashMap<String, PresenceRecord>) -> bool {
        if self.phase != PresencePhase::Synced {
            log::debug!("Dropping presence sync in phase {:?}", self.phase);
            return false;
        }
        self.state.apply_sync(snapshot);
        true
    }

    pub fn on_join(&mut self, key: &str, record: PresenceRecord) -> bool {
        if self.phase != PresencePhase::Synced {
            log::debug!("Dropping presence join for {key} in phase {:?}", self.phase);
            return false;
        }
        self.state.apply_join(key, record);
        true
    }

    pub fn on_leave(&mut self, key: &str) -> bool {
        if self.phase != PresencePhase::Synced {
            log::debug!("Dropping presence leave for {key} in phase {:?}", self.phase);
            return false;
        }
        self.state.apply_leave(key);
        true
    }

    /// Record an explicit `track` by the local side.
    pub fn set_local(&mut self, record: PresenceRecord) {
        self.local = Some(record);
    }

    pub fn clear_local(&mut self) {
        self.local = None;
    }

    /// Merge a pointer move into the last published record.
    ///
    /// `None` when cursors are disabled or nothing was tracked yet.
    pub fn update_cursor(&mut self, x: f32, y: f32) -> Option<PresenceRecord> {
        if !self.cursors || self.phase != PresencePhase::Synced {
            return None;
        }
        let record = self.local.as_ref()?.with_cursor(x, y);
        self.local = Some(record.clone());
        Some(record)
    }

    pub fn on_disconnected(&mut self) {
        self.phase = PresencePhase::Disconnected;
        self.state.clear();
        self.local = None;
    }

    pub fn phase(&self) -> PresencePhase {
        self.phase
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn local_record(&self) -> Option<&PresenceRecord> {
        self.local.as_ref()
    }

    pub fn identity(&self) -> Option<&LocalIdentity> {
        self.identity.as_ref()
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, color: &str) -> PresenceRecord {
        PresenceRecord::new(user, user.to_uppercase(), color)
    }

    fn synced_tracker() -> PresenceTracker {
        let mut tracker = PresenceTracker::new(Some(LocalIdentity::new("me", "Me")), true);
        tracker.begin_subscribe();
        tracker.on_subscribed();
        tracker
    }

    // ── PresenceState ────────────────────────────────────────────

    #[test]
    fn test_join_leave_sequence() {
        let mut state = PresenceState::new();
        state.apply_join("a", record("a", "#111"));
        state.apply_join("b", record("b", "#222"));
        state.apply_leave("a");
        state.apply_join("c", record("c", "#333"));

        assert_eq!(state.len(), 2);
        assert!(!state.contains("a"));
        assert_eq!(state.get("b").unwrap().color, "#222");
        assert_eq!(state.get("c").unwrap().color, "#333");
    }

    #[test]
    fn test_join_overwrites_same_key() {
        let mut state = PresenceState::new();
        state.apply_join("a", record("a", "#111"));
        state.apply_join("a", record("a", "#999"));
        assert_eq!(state.len(), 1);
        assert_eq!(state.get("a").unwrap().color, "#999");
    }

    #[test]
    fn test_leave_unknown_key_is_noop() {
        let mut state = PresenceState::new();
        state.apply_join("a", record("a", "#111"));
        assert!(state.apply_leave("zzz").is_none());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_sync_overwrites_join_leave_noise() {
        let mut state = PresenceState::new();
        for i in 0..20 {
            state.apply_join(format!("k{i}"), record("x", "#000"));
            if i % 3 == 0 {
                state.apply_leave(&format!("k{i}"));
            }
        }

        let mut snapshot = HashMap::new();
        snapshot.insert("only".to_string(), record("only", "#abc"));
        state.apply_sync(snapshot.clone());

        assert_eq!(state.snapshot(), snapshot);
    }

    #[test]
    fn test_diff_joins_then_leaves() {
        let mut state = PresenceState::new();
        state.apply_join("old", record("old", "#111"));

        let mut diff = PresenceDiff::join("new", record("new", "#222"));
        diff.leaves.insert("old".into(), record("old", "#111"));
        state.apply_diff(&diff);

        assert!(state.contains("new"));
        assert!(!state.contains("old"));
    }

    #[test]
    fn test_diff_constructors() {
        assert!(PresenceDiff::default().is_empty());
        assert!(!PresenceDiff::leave("a", record("a", "#1")).is_empty());
    }

    // ── Colors ───────────────────────────────────────────────────

    #[test]
    fn test_pick_color_from_palette() {
        for _ in 0..32 {
            assert!(PALETTE.contains(&pick_color()));
        }
    }

    // ── PresenceTracker ──────────────────────────────────────────

    #[test]
    fn test_tracker_phases() {
        let mut tracker = PresenceTracker::new(None, false);
        assert_eq!(tracker.phase(), PresencePhase::Disconnected);
        tracker.begin_subscribe();
        assert_eq!(tracker.phase(), PresencePhase::Subscribing);
        tracker.on_subscribed();
        assert_eq!(tracker.phase(), PresencePhase::Synced);
        tracker.on_disconnected();
        assert_eq!(tracker.phase(), PresencePhase::Disconnected);
    }

    #[test]
    fn test_subscribed_tracks_identity_with_palette_color() {
        let mut tracker = PresenceTracker::new(Some(LocalIdentity::new("u1", "Ada")), false);
        tracker.begin_subscribe();
        let record = tracker.on_subscribed().unwrap();

        assert_eq!(record.user_id, "u1");
        assert_eq!(record.display_name, "Ada");
        assert!(PALETTE.contains(&record.color.as_str()));
        assert!(record.cursor.is_none());
        assert_eq!(tracker.local_record(), Some(&record));
    }

    #[test]
    fn test_missing_identity_skips_tracking() {
        let mut tracker = PresenceTracker::new(None, true);
        tracker.begin_subscribe();
        assert!(tracker.on_subscribed().is_none());
        assert_eq!(tracker.phase(), PresencePhase::Synced);
        assert!(tracker.update_cursor(1.0, 1.0).is_none());
    }

    #[test]
    fn test_events_before_synced_are_dropped() {
        let mut tracker = PresenceTracker::new(None, false);
        tracker.begin_subscribe();
        assert!(!tracker.on_join("a", record("a", "#1")));
        assert!(!tracker.on_sync(HashMap::new()));
        assert!(tracker.state().is_empty());
    }

    #[test]
    fn test_cursor_merges_into_last_record() {
        let mut tracker = synced_tracker();
        let color = tracker.local_record().unwrap().color.clone();

        let moved = tracker.update_cursor(10.0, 20.0).unwrap();
        assert_eq!(moved.cursor, Some(Cursor { x: 10.0, y: 20.0 }));
        assert_eq!(moved.color, color);
        assert_eq!(moved.user_id, "me");

        let moved_again = tracker.update_cursor(11.0, 21.0).unwrap();
        assert_eq!(moved_again.cursor, Some(Cursor { x: 11.0, y: 21.0 }));
        assert_eq!(tracker.local_record(), Some(&moved_again));
    }

    #[test]
    fn test_cursor_disabled() {
        let mut tracker = PresenceTracker::new(Some(LocalIdentity::new("me", "Me")), false);
        tracker.begin_subscribe();
        tracker.on_subscribed();
        assert!(tracker.update_cursor(1.0, 2.0).is_none());
    }

    #[test]
    fn test_explicit_track_replaces_local() {
        let mut tracker = synced_tracker();
        tracker.set_local(record("me", "#fff"));
        let moved = tracker.update_cursor(3.0, 4.0).unwrap();
        assert_eq!(moved.color, "#fff");

        tracker.clear_local();
        assert!(tracker.update_cursor(5.0, 6.0).is_none());
    }

    #[test]
    fn test_disconnect_clears_state() {
        let mut tracker = synced_tracker();
        tracker.on_join("a", record("a", "#1"));
        tracker.on_disconnected();
        assert!(tracker.state().is_empty());
        assert!(tracker.local_record().is_none());
    }
}
