//! Collaboration events and their JSON codec.
//!
//! Every mutating operation on the coordinator publishes exactly one
//! `CollaborationEvent` for its scope. Events are fire-and-forget: they are
//! handed to whichever listeners are registered at that moment and never
//! stored. Transport adapters own the wire protocol; the JSON helpers here
//! exist for that hand-off.
//!
//! Reference: Kleppmann, Chapter 11 — Messaging Systems

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
///
/// Wall-clock stamps on the public model use this. TTL expiry does not — it
/// runs on monotonic instants (see `presence`).
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What kind of mutation produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Join,
    Leave,
    Edit,
    Comment,
    CursorMove,
    SelectionChange,
    Typing,
}

impl EventKind {
    /// Stable string label, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Edit => "edit",
            EventKind::Comment => "comment",
            EventKind::CursorMove => "cursor_move",
            EventKind::SelectionChange => "selection_change",
            EventKind::Typing => "typing",
        }
    }
}

/// One fire-and-forget collaboration event.
///
/// Write-once: built by the coordinator, dispatched synchronously to the
/// scope's listeners, then dropped. `data` is free-form and shaped by the
/// operation that emitted the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationEvent {
    pub id: String,
    pub kind: EventKind,
    pub user_id: String,
    /// The use-case id the event belongs to.
    pub scope: String,
    pub timestamp: u64,
    pub data: Value,
    pub metadata: Option<Value>,
}

impl CollaborationEvent {
    /// Build an event with a fresh id and the current wall clock.
    pub fn new(
        kind: EventKind,
        scope: impl Into<String>,
        user_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            user_id: user_id.into(),
            scope: scope.into(),
            timestamp: epoch_millis(),
            data,
            metadata: None,
        }
    }

    /// Attach free-form metadata (transport hints, trace ids).
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Encode to a JSON string for the wire.
    pub fn to_json(&self) -> Result<String, EventCodecError> {
        serde_json::to_string(self).map_err(EventCodecError::Encode)
    }

    /// Decode from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, EventCodecError> {
        serde_json::from_str(raw).map_err(EventCodecError::Decode)
    }
}

/// Errors from the event JSON codec.
#[derive(Debug, Error)]
pub enum EventCodecError {
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),
}
