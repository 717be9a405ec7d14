//! # collab-coordinator — In-process real-time collaboration coordinator
//!
//! Session rosters, ephemeral presence, threaded comments, capability
//! grants, and per-scope event fan-out for shared compliance documents.
//! Everything lives in process memory; an HTTP layer or bidirectional
//! transport adapter sits in front and owns the wire.
//!
//! ## Architecture
//!
//! ```text
//!   callers (route handlers / transport adapters)
//!                      │
//!                      ▼
//!        CollaborationCoordinator ◄──── Janitor (periodic sweeps)
//!                      │
//!      ┌──────────┬────┴─────┬──────────────┐
//!      ▼          ▼          ▼              ▼
//!   sessions   presence   comments     permissions
//!                      │
//!                      ▼
//!                  EventBus ──► per-scope listeners
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the facade struct, its config, and stats snapshots
//! - [`session`]: per-scope rosters and the currently-active subset
//! - [`presence`]: cursors, selections, typing indicators with TTL decay
//! - [`comments`]: threaded, reactable comment store
//! - [`permissions`]: per-scope capability grants with a default-deny check
//! - [`bus`]: synchronous per-scope event dispatch with fault isolation
//! - [`event`]: the event model and its JSON codec
//! - [`janitor`]: background sweeps with an owned start/stop lifecycle
//!
//! Collaboration state is best-effort: mutations never fail, unknown scopes
//! and ids degrade to `None`/`false`/empty, and a panicking listener is
//! caught and logged instead of reaching the mutator.
//!
//! ## Performance Targets
//!
//! | Operation           | Target        | Notes                              |
//! |---------------------|---------------|------------------------------------|
//! | Presence update     | <10μs         | one lock, one insert, one dispatch |
//! | Active-cursor query | <50μs         | filter over a roster-sized map     |
//! | Comment append      | <20μs         | uuid assign + event snapshot       |
//! | Event dispatch      | <1μs/listener | synchronous fan-out                |

pub mod bus;
pub mod comments;
pub mod coordinator;
pub mod event;
pub mod janitor;
pub mod permissions;
pub mod presence;
pub mod session;

// Re-exports for convenience
pub use bus::{BusStats, CollaborationListener, EventBus};
pub use comments::{CollaborationComment, CommentDraft, CommentPatch};
pub use coordinator::{
    CollaborationCoordinator, CollaborationStats, CoordinatorConfig, CoordinatorStats,
};
pub use event::{CollaborationEvent, EventCodecError, EventKind};
pub use janitor::Janitor;
pub use permissions::{Capability, CollaborationPermission};
pub use presence::{CursorPosition, SelectionRange, TypingIndicator};
pub use session::{CollaborationSession, CollaborationUser, UserRole, UserStatus};
