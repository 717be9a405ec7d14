//! Background reclamation of expired collaboration state.
//!
//! Three sweep loops with independent cadences, each driving one facade
//! sweep: idle sessions (every 5 min), stale cursors and selections (every
//! 30 s), stale typing indicators (every 10 s). Each loop holds nothing but
//! a coordinator clone.
//!
//! The handle owns its tasks: `stop()`, or dropping the `Janitor`, aborts
//! the loops, so tests and graceful shutdown do not leak timers. Sweeps are
//! idempotent and the facade exposes them directly for deterministic tests.

use log::info;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::coordinator::CollaborationCoordinator;

/// Handle to the three running sweep loops.
pub struct Janitor {
    tasks: Vec<JoinHandle<()>>,
}

impl Janitor {
    /// Spawn the sweep loops on the current runtime.
    ///
    /// Cadences come from the coordinator's config. Each loop also runs once
    /// on startup, which on a fresh coordinator reclaims nothing.
    pub fn start(coordinator: CollaborationCoordinator) -> Self {
        let config = coordinator.config();
        let session_every = config.session_sweep_interval;
        let presence_every = config.presence_sweep_interval;
        let typing_every = config.typing_sweep_interval;

        let sessions = coordinator.clone();
        let session_task = tokio::spawn(async move {
            let mut ticker = interval(session_every);
            loop {
                ticker.tick().await;
                sessions.sweep_inactive_sessions().await;
            }
        });

        let presence = coordinator.clone();
        let presence_task = tokio::spawn(async move {
            let mut ticker = interval(presence_every);
            loop {
                ticker.tick().await;
                presence.sweep_stale_presence().await;
            }
        });

        let typing = coordinator;
        let typing_task = tokio::spawn(async move {
            let mut ticker = interval(typing_every);
            loop {
                ticker.tick().await;
                typing.sweep_stale_typing().await;
            }
        });

        info!(
            "janitor started: sessions every {:?}, presence every {:?}, typing every {:?}",
            session_every, presence_every, typing_every
        );
        Self {
            tasks: vec![session_task, presence_task, typing_task],
        }
    }

    /// Abort the sweep loops. Idempotent; nothing sweeps after this returns.
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("janitor stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::session::{CollaborationUser, UserRole};
    use std::time::Duration;
    use tokio::time::{advance, sleep};

    fn alice() -> CollaborationUser {
        CollaborationUser::new("u-alice", "Alice", "alice@example.com", UserRole::Owner)
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_reclaims_stale_presence() {
        let coordinator = CollaborationCoordinator::new();
        let mut janitor = Janitor::start(coordinator.clone());
        // Let the loops spin up and run their startup sweeps.
        sleep(Duration::from_millis(1)).await;

        coordinator.create_session("uc-1", alice()).await;
        coordinator
            .update_cursor("uc-1", "u-alice", "Alice", 1.0, 2.0, None)
            .await;
        assert_eq!(coordinator.stats().await.presence_entries, 1);

        // Past the 30s window and the 30s sweep cadence.
        advance(Duration::from_secs(31)).await;
        sleep(Duration::from_millis(1)).await;

        let stats = coordinator.stats().await;
        assert_eq!(stats.presence_entries, 0);
        assert_eq!(stats.presence_entries_reclaimed, 1);
        janitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_deactivates_idle_sessions() {
        let config = CoordinatorConfig {
            session_idle_timeout: Duration::from_millis(1),
            session_sweep_interval: Duration::from_secs(5),
            ..Default::default()
        };
        let coordinator = CollaborationCoordinator::with_config(config);
        let mut janitor = Janitor::start(coordinator.clone());
        sleep(Duration::from_millis(1)).await;

        coordinator.create_session("uc-1", alice()).await;
        // Session staleness is wall-clock; let real time pass the threshold.
        std::thread::sleep(Duration::from_millis(10));

        advance(Duration::from_secs(6)).await;
        sleep(Duration::from_millis(1)).await;

        let session = coordinator.get_session("uc-1").await.unwrap();
        assert!(!session.is_active);
        assert!(session.active_users.is_empty());
        assert_eq!(coordinator.stats().await.sessions_deactivated, 1);
        janitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_sweeping() {
        let coordinator = CollaborationCoordinator::new();
        let mut janitor = Janitor::start(coordinator.clone());
        sleep(Duration::from_millis(1)).await;
        assert!(janitor.is_running());

        coordinator.create_session("uc-1", alice()).await;
        coordinator
            .update_cursor("uc-1", "u-alice", "Alice", 1.0, 2.0, None)
            .await;

        janitor.stop();
        assert!(!janitor.is_running());
        janitor.stop();

        advance(Duration::from_secs(120)).await;
        sleep(Duration::from_millis(1)).await;

        // Entry went stale but nothing reclaimed it.
        assert_eq!(coordinator.stats().await.presence_entries, 1);
        assert!(coordinator.active_cursors("uc-1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_tasks() {
        let coordinator = CollaborationCoordinator::new();
        let janitor = Janitor::start(coordinator.clone());
        sleep(Duration::from_millis(1)).await;

        coordinator.create_session("uc-1", alice()).await;
        coordinator
            .update_cursor("uc-1", "u-alice", "Alice", 1.0, 2.0, None)
            .await;
        drop(janitor);

        advance(Duration::from_secs(120)).await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(coordinator.stats().await.presence_entries, 1);
    }
}
