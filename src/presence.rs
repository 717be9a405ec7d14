//! Ephemeral presence state: cursors, selections, typing indicators.
//!
//! Presence is overwrite-only and decays on read. Every update replaces the
//! user's previous entry for the scope and restamps its freshness clock;
//! reads filter by both session membership and a time-to-live, so a stale
//! cursor disappears from queries long before the janitor physically
//! reclaims the entry.
//!
//! ```text
//!   update_cursor ────► cursors[scope][user] = Timed(position)
//!                                    │
//!   active_cursors ◄────────────────┤  filter: user in active set
//!                                    │          age within ttl
//!   sweep_presence ─────────────────┘  retain fresh, drop empty scopes
//! ```
//!
//! Two freshness classes: cursors and selections stay visible for 30 seconds
//! by default, typing indicators for 10. The windows live in
//! `CoordinatorConfig`; the tracker takes them per call and stays config-free.
//!
//! Performance target: <1μs per update (two hash lookups and an insert).
//!
//! Reference: the ephemeral-state model follows the Yjs awareness protocol
//! (https://github.com/yjs/y-protocols), minus the network layer.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::event::epoch_millis;

// ───────────────────────────────────────────────────────────────────
// Presence payloads
// ───────────────────────────────────────────────────────────────────

/// Where a user's cursor sits, in document coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub user_id: String,
    pub user_name: String,
    pub x: f64,
    pub y: f64,
    /// Form field or document region the cursor is in, if any.
    pub field: Option<String>,
    pub timestamp: u64,
}

impl CursorPosition {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            x,
            y,
            field: None,
            timestamp: epoch_millis(),
        }
    }

    pub fn in_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// A highlighted text range within one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub user_id: String,
    pub user_name: String,
    pub field: String,
    pub start: usize,
    pub end: usize,
    pub timestamp: u64,
}

impl SelectionRange {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        field: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            field: field.into(),
            start,
            end,
            timestamp: epoch_millis(),
        }
    }
}

/// "Alice is typing in the summary field."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub user_id: String,
    pub user_name: String,
    pub field: String,
    pub is_typing: bool,
    pub timestamp: u64,
}

impl TypingIndicator {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        field: impl Into<String>,
        is_typing: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            field: field.into(),
            is_typing,
            timestamp: epoch_millis(),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Tracker
// ───────────────────────────────────────────────────────────────────

/// A value plus the monotonic instant it was last refreshed.
///
/// Freshness math runs on `tokio::time::Instant` so tests can drive it
/// through the paused clock; the wall-clock `timestamp` on the payload is
/// for display only.
#[derive(Debug, Clone)]
struct Timed<T> {
    value: T,
    refreshed: Instant,
}

impl<T> Timed<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            refreshed: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed.elapsed() <= ttl
    }
}

type ScopedEntries<T> = HashMap<String, HashMap<String, Timed<T>>>;

fn collect_fresh<T: Clone>(
    map: &ScopedEntries<T>,
    scope: &str,
    active_users: &[String],
    ttl: Duration,
) -> Vec<T> {
    let entries = match map.get(scope) {
        Some(entries) => entries,
        None => return Vec::new(),
    };
    // Walk the active list, not the map: output order follows join order.
    active_users
        .iter()
        .filter_map(|id| entries.get(id))
        .filter(|timed| timed.is_fresh(ttl))
        .map(|timed| timed.value.clone())
        .collect()
}

fn remove_entry<T>(map: &mut ScopedEntries<T>, scope: &str, user_id: &str) -> bool {
    let entries = match map.get_mut(scope) {
        Some(entries) => entries,
        None => return false,
    };
    let removed = entries.remove(user_id).is_some();
    if entries.is_empty() {
        map.remove(scope);
    }
    removed
}

fn sweep_map<T>(map: &mut ScopedEntries<T>, ttl: Duration) -> usize {
    let mut removed = 0;
    map.retain(|_, entries| {
        let before = entries.len();
        entries.retain(|_, timed| timed.is_fresh(ttl));
        removed += before - entries.len();
        !entries.is_empty()
    });
    removed
}

/// Scope-keyed store of per-user presence entries.
///
/// Pure state, like `SessionRegistry`: the facade serializes access, passes
/// in the active-user list for reads, and publishes the events.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    cursors: ScopedEntries<CursorPosition>,
    selections: ScopedEntries<SelectionRange>,
    typing: ScopedEntries<TypingIndicator>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the user's cursor for the scope, whatever was there before.
    pub fn update_cursor(&mut self, scope: &str, cursor: CursorPosition) {
        self.cursors
            .entry(scope.to_string())
            .or_default()
            .insert(cursor.user_id.clone(), Timed::new(cursor));
    }

    /// Replace the user's selection for the scope.
    pub fn update_selection(&mut self, scope: &str, selection: SelectionRange) {
        self.selections
            .entry(scope.to_string())
            .or_default()
            .insert(selection.user_id.clone(), Timed::new(selection));
    }

    /// Store a typing indicator, or drop it when `is_typing` is false.
    ///
    /// A stop is an immediate removal, not a tombstone: the next read shows
    /// nothing for the user without waiting out the window.
    pub fn update_typing(&mut self, scope: &str, indicator: TypingIndicator) {
        if indicator.is_typing {
            self.typing
                .entry(scope.to_string())
                .or_default()
                .insert(indicator.user_id.clone(), Timed::new(indicator));
        } else {
            remove_entry(&mut self.typing, scope, &indicator.user_id);
        }
    }

    /// Drop every presence entry the user holds in the scope.
    ///
    /// Called on leave so a departed user's cursor never lingers for the
    /// rest of its window.
    pub fn clear_user(&mut self, scope: &str, user_id: &str) {
        remove_entry(&mut self.cursors, scope, user_id);
        remove_entry(&mut self.selections, scope, user_id);
        remove_entry(&mut self.typing, scope, user_id);
    }

    /// Fresh cursors of currently active users, in join order.
    pub fn active_cursors(
        &self,
        scope: &str,
        active_users: &[String],
        ttl: Duration,
    ) -> Vec<CursorPosition> {
        collect_fresh(&self.cursors, scope, active_users, ttl)
    }

    /// Fresh selections of currently active users, in join order.
    pub fn active_selections(
        &self,
        scope: &str,
        active_users: &[String],
        ttl: Duration,
    ) -> Vec<SelectionRange> {
        collect_fresh(&self.selections, scope, active_users, ttl)
    }

    /// Fresh typing indicators of currently active users, in join order.
    pub fn active_typing(
        &self,
        scope: &str,
        active_users: &[String],
        ttl: Duration,
    ) -> Vec<TypingIndicator> {
        collect_fresh(&self.typing, scope, active_users, ttl)
    }

    /// Physically remove cursor and selection entries older than `ttl`.
    pub fn sweep_presence(&mut self, ttl: Duration) -> usize {
        sweep_map(&mut self.cursors, ttl) + sweep_map(&mut self.selections, ttl)
    }

    /// Physically remove typing indicators older than `ttl`.
    pub fn sweep_typing(&mut self, ttl: Duration) -> usize {
        sweep_map(&mut self.typing, ttl)
    }

    /// Total stored entries across all scopes and kinds.
    pub fn entry_count(&self) -> usize {
        fn count<T>(map: &ScopedEntries<T>) -> usize {
            map.values().map(|entries| entries.len()).sum()
        }
        count(&self.cursors) + count(&self.selections) + count(&self.typing)
    }
}
