//! Collaboration facade over sessions, presence, comments, and permissions.
//!
//! One struct owns every per-scope store behind a single
//! `tokio::sync::RwLock` and publishes one event per mutation on the
//! internal bus while the write guard is still held, so listeners observe
//! events in exactly the order the mutations applied. Same-scope calls are
//! serialized; different scopes share nothing but the lock.
//!
//! ```text
//!   caller ──► CollaborationCoordinator ──► CoordinatorState (RwLock)
//!                        │                     ├── SessionRegistry
//!                        │                     ├── PresenceTracker
//!                        │                     ├── CommentStore
//!                        ▼                     └── PermissionRegistry
//!                    EventBus ──► transport listeners
//! ```
//!
//! Listener callbacks run synchronously on the mutating task and must not
//! call back into the coordinator's async surface.
//!
//! Performance target: <10μs per mutation under light contention (one lock
//! acquisition, one store touch, one synchronous dispatch).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::bus::{CollaborationListener, EventBus};
use crate::comments::{CollaborationComment, CommentDraft, CommentPatch, CommentStore};
use crate::event::{CollaborationEvent, EventKind};
use crate::permissions::{Capability, CollaborationPermission, PermissionRegistry};
use crate::presence::{CursorPosition, PresenceTracker, SelectionRange, TypingIndicator};
use crate::session::{CollaborationSession, CollaborationUser, SessionRegistry};

// ───────────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────────

/// Freshness windows and janitor cadences.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a cursor or selection stays visible without a refresh.
    pub presence_ttl: Duration,
    /// How long a typing indicator stays visible without a refresh.
    pub typing_ttl: Duration,
    /// Idle time after which a session is marked inactive.
    pub session_idle_timeout: Duration,
    /// How often the janitor checks for idle sessions.
    pub session_sweep_interval: Duration,
    /// How often the janitor reclaims stale cursors and selections.
    pub presence_sweep_interval: Duration,
    /// How often the janitor reclaims stale typing indicators.
    pub typing_sweep_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            presence_ttl: Duration::from_secs(30),
            typing_ttl: Duration::from_secs(10),
            session_idle_timeout: Duration::from_secs(30 * 60),
            session_sweep_interval: Duration::from_secs(5 * 60),
            presence_sweep_interval: Duration::from_secs(30),
            typing_sweep_interval: Duration::from_secs(10),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Stats
// ───────────────────────────────────────────────────────────────────

/// Point-in-time snapshot of one scope.
#[derive(Debug, Clone, Serialize)]
pub struct CollaborationStats {
    pub scope: String,
    pub participants: usize,
    pub active_users: usize,
    pub comments: usize,
    pub unresolved_comments: usize,
    pub live_cursors: usize,
    pub live_selections: usize,
    pub typing_users: usize,
    pub is_active: bool,
    pub last_activity: u64,
}

/// Process-wide counters across all scopes.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    pub sessions: usize,
    pub active_sessions: usize,
    pub total_comments: usize,
    pub presence_entries: usize,
    pub registered_listeners: usize,
    pub events_published: u64,
    pub listener_failures: u64,
    pub sessions_deactivated: u64,
    pub presence_entries_reclaimed: u64,
    pub typing_indicators_reclaimed: u64,
}

/// Lock-free sweep totals, incremented outside the state lock.
#[derive(Debug, Default)]
struct AtomicSweepStats {
    sessions_deactivated: AtomicU64,
    presence_entries_reclaimed: AtomicU64,
    typing_indicators_reclaimed: AtomicU64,
}

// ───────────────────────────────────────────────────────────────────
// Coordinator
// ───────────────────────────────────────────────────────────────────

/// Everything behind the coordinator's write lock.
#[derive(Debug, Default)]
struct CoordinatorState {
    sessions: SessionRegistry,
    presence: PresenceTracker,
    comments: CommentStore,
    permissions: PermissionRegistry,
}

/// The single entry point for collaboration state.
///
/// Cheap to clone (all shared state is behind `Arc`); the janitor holds its
/// own clone. One instance per process is typical but nothing prevents
/// isolated instances, which is how the tests run.
#[derive(Clone)]
pub struct CollaborationCoordinator {
    config: CoordinatorConfig,
    state: Arc<RwLock<CoordinatorState>>,
    bus: Arc<EventBus>,
    sweep_stats: Arc<AtomicSweepStats>,
}

impl CollaborationCoordinator {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CoordinatorState::default())),
            bus: Arc::new(EventBus::new()),
            sweep_stats: Arc::new(AtomicSweepStats::default()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ─── Sessions ──────────────────────────────────────────────────

    /// Start (or reset) the scope's session with `user` as sole participant.
    pub async fn create_session(&self, scope: &str, user: CollaborationUser) -> CollaborationSession {
        let mut state = self.state.write().await;
        state.sessions.create(scope, user)
    }

    /// Join the scope's session. `None` when no session exists yet.
    ///
    /// Emits a `join` event carrying the user's name and role.
    pub async fn join_session(
        &self,
        scope: &str,
        user: CollaborationUser,
    ) -> Option<CollaborationSession> {
        let user_id = user.id.clone();
        let user_name = user.name.clone();
        let role = user.role;

        let mut state = self.state.write().await;
        let session = state.sessions.join(scope, user)?;
        let data = json!({ "user_name": user_name, "role": role.as_str() });
        let event = CollaborationEvent::new(EventKind::Join, scope, user_id, data)
            .with_metadata(json!({ "participants": session.participants.len() }));
        self.bus.emit(&event);
        Some(session)
    }

    /// Disconnect a user: keep the roster entry offline, drop their presence.
    ///
    /// Emits a `leave` event; silent no-op when the scope has no session.
    pub async fn leave_session(&self, scope: &str, user_id: &str) {
        let mut state = self.state.write().await;
        if !state.sessions.leave(scope, user_id) {
            return;
        }
        // Eager cleanup, not left to the TTL window.
        state.presence.clear_user(scope, user_id);
        let event = CollaborationEvent::new(EventKind::Leave, scope, user_id, json!({}));
        self.bus.emit(&event);
    }

    /// Snapshot of the scope's session.
    pub async fn get_session(&self, scope: &str) -> Option<CollaborationSession> {
        self.state.read().await.sessions.get(scope).cloned()
    }

    /// Record what a participant is doing ("editing risk matrix").
    ///
    /// Emits an `edit` event carrying the label; silent no-op when the scope
    /// or participant is unknown.
    pub async fn set_user_activity(&self, scope: &str, user_id: &str, activity: Option<&str>) {
        let mut state = self.state.write().await;
        if !state
            .sessions
            .set_activity(scope, user_id, activity.map(String::from))
        {
            return;
        }
        let data = json!({ "activity": activity });
        let event = CollaborationEvent::new(EventKind::Edit, scope, user_id, data);
        self.bus.emit(&event);
    }

    // ─── Presence ──────────────────────────────────────────────────

    /// Overwrite the user's cursor. Emits `cursor_move`.
    pub async fn update_cursor(
        &self,
        scope: &str,
        user_id: &str,
        user_name: &str,
        x: f64,
        y: f64,
        field: Option<&str>,
    ) {
        trace!("cursor update from {} in scope {}", user_id, scope);
        let mut cursor = CursorPosition::new(user_id, user_name, x, y);
        if let Some(field) = field {
            cursor = cursor.in_field(field);
        }
        let data = json!({ "x": x, "y": y, "field": field });

        let mut state = self.state.write().await;
        state.presence.update_cursor(scope, cursor);
        let event = CollaborationEvent::new(EventKind::CursorMove, scope, user_id, data);
        self.bus.emit(&event);
    }

    /// Overwrite the user's selection. Emits `selection_change`.
    pub async fn update_selection(
        &self,
        scope: &str,
        user_id: &str,
        user_name: &str,
        start: usize,
        end: usize,
        field: &str,
    ) {
        trace!("selection update from {} in scope {}", user_id, scope);
        let selection = SelectionRange::new(user_id, user_name, field, start, end);
        let data = json!({ "field": field, "start": start, "end": end });

        let mut state = self.state.write().await;
        state.presence.update_selection(scope, selection);
        let event = CollaborationEvent::new(EventKind::SelectionChange, scope, user_id, data);
        self.bus.emit(&event);
    }

    /// Set or clear the user's typing indicator. Emits `typing` either way.
    pub async fn set_typing_indicator(
        &self,
        scope: &str,
        user_id: &str,
        user_name: &str,
        field: &str,
        is_typing: bool,
    ) {
        let indicator = TypingIndicator::new(user_id, user_name, field, is_typing);
        let data = json!({ "field": field, "is_typing": is_typing });

        let mut state = self.state.write().await;
        state.presence.update_typing(scope, indicator);
        let event = CollaborationEvent::new(EventKind::Typing, scope, user_id, data);
        self.bus.emit(&event);
    }

    /// Fresh cursors of currently active users. Empty without a session.
    pub async fn active_cursors(&self, scope: &str) -> Vec<CursorPosition> {
        let state = self.state.read().await;
        let session = match state.sessions.get(scope) {
            Some(session) => session,
            None => return Vec::new(),
        };
        state
            .presence
            .active_cursors(scope, &session.active_users, self.config.presence_ttl)
    }

    /// Fresh selections of currently active users. Empty without a session.
    pub async fn active_selections(&self, scope: &str) -> Vec<SelectionRange> {
        let state = self.state.read().await;
        let session = match state.sessions.get(scope) {
            Some(session) => session,
            None => return Vec::new(),
        };
        state
            .presence
            .active_selections(scope, &session.active_users, self.config.presence_ttl)
    }

    /// Who is typing right now. Empty without a session.
    pub async fn typing_indicators(&self, scope: &str) -> Vec<TypingIndicator> {
        let state = self.state.read().await;
        let session = match state.sessions.get(scope) {
            Some(session) => session,
            None => return Vec::new(),
        };
        state
            .presence
            .active_typing(scope, &session.active_users, self.config.typing_ttl)
    }

    // ─── Comments ──────────────────────────────────────────────────

    /// Append a comment and return the stored form. Emits `comment`.
    pub async fn add_comment(&self, scope: &str, draft: CommentDraft) -> CollaborationComment {
        let mut state = self.state.write().await;
        let comment = state.comments.add(scope, draft);
        let data = json!({ "action": "added", "comment": comment });
        let event =
            CollaborationEvent::new(EventKind::Comment, scope, comment.author.id.clone(), data);
        self.bus.emit(&event);
        comment
    }

    /// All comments for the scope, resolved ones included.
    pub async fn comments(&self, scope: &str) -> Vec<CollaborationComment> {
        self.state.read().await.comments.list(scope).to_vec()
    }

    /// Patch a comment. `None` when scope or id is unknown. Emits `comment`.
    pub async fn update_comment(
        &self,
        scope: &str,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Option<CollaborationComment> {
        let mut state = self.state.write().await;
        let comment = state.comments.update(scope, comment_id, patch)?;
        let data = json!({ "action": "updated", "comment": comment });
        let event =
            CollaborationEvent::new(EventKind::Comment, scope, comment.author.id.clone(), data);
        self.bus.emit(&event);
        Some(comment)
    }

    /// Remove a comment and its thread. No event is emitted for deletion.
    pub async fn delete_comment(&self, scope: &str, comment_id: &str) -> bool {
        self.state.write().await.comments.delete(scope, comment_id)
    }

    /// React to a comment, deduplicated per user and label. Emits `comment`.
    pub async fn add_comment_reaction(
        &self,
        scope: &str,
        comment_id: &str,
        user_id: &str,
        reaction: &str,
    ) -> Option<CollaborationComment> {
        let mut state = self.state.write().await;
        let comment = state.comments.add_reaction(scope, comment_id, user_id, reaction)?;
        let data = json!({ "action": "reaction", "comment_id": comment_id, "reaction": reaction });
        let event = CollaborationEvent::new(EventKind::Comment, scope, user_id, data);
        self.bus.emit(&event);
        Some(comment)
    }

    // ─── Permissions ───────────────────────────────────────────────

    /// Replace the scope's entire grant list.
    pub async fn set_permissions(&self, scope: &str, permissions: Vec<CollaborationPermission>) {
        self.state.write().await.permissions.set(scope, permissions);
    }

    /// All grants for the scope.
    pub async fn permissions(&self, scope: &str) -> Vec<CollaborationPermission> {
        self.state.read().await.permissions.list(scope).to_vec()
    }

    /// The user's explicit grant, if any.
    pub async fn user_permissions(
        &self,
        scope: &str,
        user_id: &str,
    ) -> Option<CollaborationPermission> {
        self.state.read().await.permissions.for_user(scope, user_id).cloned()
    }

    /// Capability check with a default-deny contract: no grant means `false`.
    pub async fn can(&self, scope: &str, user_id: &str, capability: Capability) -> bool {
        self.state.read().await.permissions.allows(scope, user_id, capability)
    }

    // ─── Events ────────────────────────────────────────────────────

    /// Subscribe a transport listener to one scope's events.
    pub fn add_event_listener(&self, scope: &str, listener: Arc<dyn CollaborationListener>) {
        self.bus.add_listener(scope, listener);
    }

    /// Unsubscribe by handle identity. Returns whether anything was removed.
    pub fn remove_event_listener(
        &self,
        scope: &str,
        listener: &Arc<dyn CollaborationListener>,
    ) -> bool {
        self.bus.remove_listener(scope, listener)
    }

    /// Listeners currently registered for the scope.
    pub fn listener_count(&self, scope: &str) -> usize {
        self.bus.listener_count(scope)
    }

    // ─── Maintenance ───────────────────────────────────────────────

    /// Mark sessions idle past the configured threshold inactive.
    ///
    /// The janitor calls this on its cadence; tests call it directly.
    pub async fn sweep_inactive_sessions(&self) -> usize {
        let mut state = self.state.write().await;
        let swept = state.sessions.sweep_inactive(self.config.session_idle_timeout);
        drop(state);
        if swept > 0 {
            self.sweep_stats
                .sessions_deactivated
                .fetch_add(swept as u64, Ordering::Relaxed);
            debug!("session sweep deactivated {} sessions", swept);
        }
        swept
    }

    /// Reclaim cursors and selections past the presence window.
    pub async fn sweep_stale_presence(&self) -> usize {
        let mut state = self.state.write().await;
        let removed = state.presence.sweep_presence(self.config.presence_ttl);
        drop(state);
        if removed > 0 {
            self.sweep_stats
                .presence_entries_reclaimed
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("presence sweep reclaimed {} entries", removed);
        }
        removed
    }

    /// Reclaim typing indicators past the typing window.
    pub async fn sweep_stale_typing(&self) -> usize {
        let mut state = self.state.write().await;
        let removed = state.presence.sweep_typing(self.config.typing_ttl);
        drop(state);
        if removed > 0 {
            self.sweep_stats
                .typing_indicators_reclaimed
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("typing sweep reclaimed {} indicators", removed);
        }
        removed
    }

    // ─── Stats ─────────────────────────────────────────────────────

    /// Per-scope snapshot. `None` when the scope has no session.
    pub async fn collaboration_stats(&self, scope: &str) -> Option<CollaborationStats> {
        let state = self.state.read().await;
        let session = state.sessions.get(scope)?;
        let active = &session.active_users;
        Some(CollaborationStats {
            scope: scope.to_string(),
            participants: session.participants.len(),
            active_users: active.len(),
            comments: state.comments.count(scope),
            unresolved_comments: state.comments.unresolved_count(scope),
            live_cursors: state
                .presence
                .active_cursors(scope, active, self.config.presence_ttl)
                .len(),
            live_selections: state
                .presence
                .active_selections(scope, active, self.config.presence_ttl)
                .len(),
            typing_users: state
                .presence
                .active_typing(scope, active, self.config.typing_ttl)
                .len(),
            is_active: session.is_active,
            last_activity: session.last_activity,
        })
    }

    /// Process-wide snapshot across every scope.
    pub async fn stats(&self) -> CoordinatorStats {
        let state = self.state.read().await;
        let bus = self.bus.stats();
        CoordinatorStats {
            sessions: state.sessions.len(),
            active_sessions: state.sessions.active_len(),
            total_comments: state.comments.total(),
            presence_entries: state.presence.entry_count(),
            registered_listeners: bus.registered_listeners,
            events_published: bus.events_published,
            listener_failures: bus.listener_failures,
            sessions_deactivated: self.sweep_stats.sessions_deactivated.load(Ordering::Relaxed),
            presence_entries_reclaimed: self
                .sweep_stats
                .presence_entries_reclaimed
                .load(Ordering::Relaxed),
            typing_indicators_reclaimed: self
                .sweep_stats
                .typing_indicators_reclaimed
                .load(Ordering::Relaxed),
        }
    }
}

impl Default for CollaborationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserRole;
    use parking_lot::Mutex;

    struct Recorder {
        events: Mutex<Vec<CollaborationEvent>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().iter().map(|e| e.kind).collect()
        }
    }

    impl CollaborationListener for Recorder {
        fn on_event(&self, event: &CollaborationEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn alice() -> CollaborationUser {
        CollaborationUser::new("u-alice", "Alice", "alice@example.com", UserRole::Owner)
    }

    fn bob() -> CollaborationUser {
        CollaborationUser::new("u-bob", "Bob", "bob@example.com", UserRole::Editor)
    }

    #[tokio::test]
    async fn test_join_emits_event_with_roster_metadata() {
        let coordinator = CollaborationCoordinator::new();
        let recorder = Recorder::new();
        coordinator.add_event_listener("uc-1", recorder.clone());

        coordinator.create_session("uc-1", alice()).await;
        let session = coordinator.join_session("uc-1", bob()).await.unwrap();

        assert_eq!(session.active_users, vec!["u-alice", "u-bob"]);
        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Join);
        assert_eq!(events[0].user_id, "u-bob");
        assert_eq!(events[0].metadata.as_ref().unwrap()["participants"], 2);
    }

    #[tokio::test]
    async fn test_cursor_visible_only_with_session() {
        let coordinator = CollaborationCoordinator::new();
        coordinator
            .update_cursor("uc-1", "u-alice", "Alice", 12.0, 34.0, Some("summary"))
            .await;
        assert!(coordinator.active_cursors("uc-1").await.is_empty());

        coordinator.create_session("uc-1", alice()).await;
        coordinator
            .update_cursor("uc-1", "u-alice", "Alice", 12.0, 34.0, Some("summary"))
            .await;
        let cursors = coordinator.active_cursors("uc-1").await;
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].field.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn test_comment_event_carries_snapshot() {
        let coordinator = CollaborationCoordinator::new();
        let recorder = Recorder::new();
        coordinator.add_event_listener("uc-1", recorder.clone());

        coordinator.create_session("uc-1", alice()).await;
        let draft = CommentDraft::new(alice(), "risk rating seems low");
        let comment = coordinator.add_comment("uc-1", draft).await;

        let events = recorder.events.lock();
        let comment_event = events.iter().find(|e| e.kind == EventKind::Comment).unwrap();
        assert_eq!(comment_event.data["action"], "added");
        assert_eq!(comment_event.data["comment"]["id"], comment.id.as_str());
        assert_eq!(comment_event.data["comment"]["content"], "risk rating seems low");
    }

    #[tokio::test]
    async fn test_capability_check_defaults_to_deny() {
        let coordinator = CollaborationCoordinator::new();
        assert!(!coordinator.can("uc-1", "u-alice", Capability::Edit).await);

        coordinator
            .set_permissions("uc-1", vec![CollaborationPermission::commenter("u-alice")])
            .await;
        assert!(coordinator.can("uc-1", "u-alice", Capability::Comment).await);
        assert!(!coordinator.can("uc-1", "u-alice", Capability::Edit).await);
    }

    #[tokio::test]
    async fn test_mutation_order_is_event_order() {
        let coordinator = CollaborationCoordinator::new();
        let recorder = Recorder::new();
        coordinator.add_event_listener("uc-1", recorder.clone());

        coordinator.create_session("uc-1", alice()).await;
        coordinator.join_session("uc-1", bob()).await.unwrap();
        coordinator
            .update_cursor("uc-1", "u-bob", "Bob", 1.0, 2.0, None)
            .await;
        coordinator
            .set_typing_indicator("uc-1", "u-bob", "Bob", "summary", true)
            .await;
        coordinator.leave_session("uc-1", "u-bob").await;

        assert_eq!(
            recorder.kinds(),
            vec![
                EventKind::Join,
                EventKind::CursorMove,
                EventKind::Typing,
                EventKind::Leave
            ]
        );
    }

    #[tokio::test]
    async fn test_sweeps_feed_global_stats() {
        let config = CoordinatorConfig {
            session_idle_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let coordinator = CollaborationCoordinator::with_config(config);
        coordinator.create_session("uc-1", alice()).await;

        // Wall-clock staleness, hence a real sleep rather than a paused tick.
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(coordinator.sweep_inactive_sessions().await, 1);

        let stats = coordinator.stats().await;
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.sessions_deactivated, 1);
    }
}
