//! Session roster per collaboration scope.
//!
//! One `CollaborationSession` per scope. The roster is a process-lifetime
//! record: participants are appended on first join and demoted to offline on
//! leave, never removed, so "who is here now" and "who has ever been here"
//! stay separately answerable. Only `active_users` shrinks.
//!
//! Invariant: every id in `active_users` belongs to a roster entry.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::event::epoch_millis;

// ───────────────────────────────────────────────────────────────────
// User model
// ───────────────────────────────────────────────────────────────────

/// Coarse role shown on a participant profile.
///
/// A label, not an access check — per-scope permission grants are what gate
/// operations (see `permissions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Viewer => "viewer",
        }
    }
}

/// Presence status on a participant profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Away => "away",
            UserStatus::Offline => "offline",
        }
    }
}

/// A participant profile as held in a session roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub last_seen: u64,
    /// Free-text label of what the user is doing ("editing risk matrix").
    pub current_activity: Option<String>,
}

impl CollaborationUser {
    /// Build a profile that is online as of now.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            avatar: None,
            role,
            status: UserStatus::Online,
            last_seen: epoch_millis(),
            current_activity: None,
        }
    }

    /// Attach an avatar URL.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

// ───────────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────────

/// Roster and activity record for one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationSession {
    /// Everyone ever seen in this scope, unique by id, in first-join order.
    pub participants: Vec<CollaborationUser>,
    /// Ids of currently connected participants, in join order.
    pub active_users: Vec<String>,
    pub created_at: u64,
    pub last_activity: u64,
    pub is_active: bool,
}

impl CollaborationSession {
    fn new(user: CollaborationUser) -> Self {
        let now = epoch_millis();
        let active_users = vec![user.id.clone()];
        Self {
            participants: vec![user],
            active_users,
            created_at: now,
            last_activity: now,
            is_active: true,
        }
    }

    /// Whether the given user id is currently connected.
    pub fn is_user_active(&self, user_id: &str) -> bool {
        self.active_users.iter().any(|id| id == user_id)
    }
}

/// Scope-keyed session store.
///
/// Pure state: the facade serializes access and publishes the events.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, CollaborationSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session with `user` as sole participant and active user.
    ///
    /// An existing session for the scope is overwritten: this is a reset,
    /// not create-or-get.
    pub fn create(&mut self, scope: &str, mut user: CollaborationUser) -> CollaborationSession {
        user.status = UserStatus::Online;
        user.last_seen = epoch_millis();
        let session = CollaborationSession::new(user);
        self.sessions.insert(scope.to_string(), session.clone());
        info!("session created for scope {}", scope);
        session
    }

    /// Join an existing session.
    ///
    /// `None` when the scope has no session (callers create first).
    /// Re-joining refreshes the existing roster entry instead of duplicating
    /// it, and `active_users` gains the id at most once.
    pub fn join(&mut self, scope: &str, user: CollaborationUser) -> Option<CollaborationSession> {
        let session = self.sessions.get_mut(scope)?;
        let now = epoch_millis();
        let user_id = user.id.clone();

        match session.participants.iter_mut().find(|p| p.id == user_id) {
            Some(existing) => {
                existing.status = UserStatus::Online;
                existing.last_seen = now;
            }
            None => {
                let mut joined = user;
                joined.status = UserStatus::Online;
                joined.last_seen = now;
                session.participants.push(joined);
            }
        }

        if !session.active_users.iter().any(|id| id == &user_id) {
            session.active_users.push(user_id.clone());
        }

        session.last_activity = now;
        session.is_active = true;
        debug!("user {} joined scope {}", user_id, scope);
        Some(session.clone())
    }

    /// Demote a participant to offline and drop them from `active_users`.
    ///
    /// The roster entry is retained. Returns whether a session existed for
    /// the scope (the facade publishes a leave event only when one did).
    pub fn leave(&mut self, scope: &str, user_id: &str) -> bool {
        let session = match self.sessions.get_mut(scope) {
            Some(session) => session,
            None => return false,
        };

        session.active_users.retain(|id| id != user_id);
        if let Some(participant) = session.participants.iter_mut().find(|p| p.id == user_id) {
            participant.status = UserStatus::Offline;
            participant.last_seen = epoch_millis();
        }
        debug!("user {} left scope {}", user_id, scope);
        true
    }

    /// Pure read.
    pub fn get(&self, scope: &str) -> Option<&CollaborationSession> {
        self.sessions.get(scope)
    }

    /// Record what a participant is doing and refresh the activity stamps.
    ///
    /// Returns whether a roster entry was updated.
    pub fn set_activity(&mut self, scope: &str, user_id: &str, activity: Option<String>) -> bool {
        let session = match self.sessions.get_mut(scope) {
            Some(session) => session,
            None => return false,
        };
        let participant = match session.participants.iter_mut().find(|p| p.id == user_id) {
            Some(participant) => participant,
            None => return false,
        };

        let now = epoch_millis();
        participant.current_activity = activity;
        participant.last_seen = now;
        session.last_activity = now;
        true
    }

    /// Mark sessions idle for longer than `max_idle` inactive.
    ///
    /// Clears `active_users` but keeps the roster. Returns how many sessions
    /// flipped to inactive.
    pub fn sweep_inactive(&mut self, max_idle: Duration) -> usize {
        let now = epoch_millis();
        let cutoff = max_idle.as_millis() as u64;
        let mut swept = 0;

        for (scope, session) in self.sessions.iter_mut() {
            if session.is_active && now.saturating_sub(session.last_activity) > cutoff {
                session.is_active = false;
                session.active_users.clear();
                swept += 1;
                debug!("session for scope {} marked inactive", scope);
            }
        }
        swept
    }

    /// Number of sessions, active or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions currently marked active.
    pub fn active_len(&self) -> usize {
        self.sessions.values().filter(|s| s.is_active).count()
    }
}
