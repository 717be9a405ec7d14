//! Per-scope event fan-out with listener fault isolation.
//!
//! Transport adapters register one listener per scope they serve; every
//! coordinator mutation dispatches one event to that scope's listeners,
//! synchronously and in registration order. A panicking listener is caught
//! and logged so it can neither starve the listeners behind it nor fail the
//! mutation that triggered the dispatch.
//!
//! Performance target: dispatch to 100 listeners < 100µs
//! Reference: Kleppmann, Chapter 8 — Broadcast Protocols

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;

use crate::event::CollaborationEvent;

/// Receives every event published for the scope it is registered under.
///
/// Implemented by transport adapters (socket writers, test recorders).
/// Invocation happens synchronously on the mutating call path, so
/// implementations should hand work off quickly and must not call back into
/// the coordinator's async surface.
pub trait CollaborationListener: Send + Sync {
    fn on_event(&self, event: &CollaborationEvent);
}

/// Statistics for monitoring dispatch health.
#[derive(Debug, Clone, Default)]
pub struct BusStats {
    pub events_published: u64,
    pub listener_failures: u64,
    pub registered_listeners: usize,
}

/// Atomic dispatch counters — lock-free on the emit path.
struct AtomicBusStats {
    events_published: AtomicU64,
    listener_failures: AtomicU64,
}

impl AtomicBusStats {
    fn new() -> Self {
        Self {
            events_published: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
        }
    }
}

/// Scope-keyed listener registry and dispatcher.
///
/// Listeners are trait objects compared by `Arc` identity: registering the
/// same `Arc` twice yields two invocations per event, and removal detaches
/// every entry holding the `Arc` it is handed.
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn CollaborationListener>>>>,
    stats: AtomicBusStats,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            stats: AtomicBusStats::new(),
        }
    }

    /// Register a listener for one scope, behind any already registered.
    /// Dispatch preserves this order.
    pub fn add_listener(&self, scope: impl Into<String>, listener: Arc<dyn CollaborationListener>) {
        let mut listeners = self.listeners.write();
        listeners.entry(scope.into()).or_default().push(listener);
    }

    /// Remove a previously registered listener by reference identity.
    ///
    /// Returns whether anything was removed.
    pub fn remove_listener(&self, scope: &str, listener: &Arc<dyn CollaborationListener>) -> bool {
        let mut listeners = self.listeners.write();
        let scoped = match listeners.get_mut(scope) {
            Some(list) => list,
            None => return false,
        };

        let before = scoped.len();
        scoped.retain(|registered| !Arc::ptr_eq(registered, listener));
        let removed = scoped.len() != before;
        if scoped.is_empty() {
            listeners.remove(scope);
        }
        removed
    }

    /// Dispatch one event to its scope's listeners.
    ///
    /// The listener list is snapshotted first, so a listener may register or
    /// remove listeners without deadlocking; such changes take effect from
    /// the next event. A panic in one listener is caught, counted, and
    /// logged, then dispatch continues with the next.
    pub fn emit(&self, event: &CollaborationEvent) {
        let scoped: Vec<Arc<dyn CollaborationListener>> = {
            let listeners = self.listeners.read();
            match listeners.get(&event.scope) {
                Some(list) => list.clone(),
                None => Vec::new(),
            }
        };

        self.stats.events_published.fetch_add(1, Ordering::Relaxed);

        for listener in scoped {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if let Err(payload) = outcome {
                self.stats.listener_failures.fetch_add(1, Ordering::Relaxed);
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                warn!(
                    "listener panicked during {} dispatch for scope {}: {}",
                    event.kind.as_str(),
                    event.scope,
                    detail
                );
            }
        }
    }

    /// Listener count for one scope.
    pub fn listener_count(&self, scope: &str) -> usize {
        self.listeners.read().get(scope).map_or(0, Vec::len)
    }

    /// Listener count across all scopes.
    pub fn total_listeners(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Dispatch statistics (lock-free counters plus current registrations).
    pub fn stats(&self) -> BusStats {
        BusStats {
            events_published: self.stats.events_published.load(Ordering::Relaxed),
            listener_failures: self.stats.listener_failures.load(Ordering::Relaxed),
            registered_listeners: self.total_listeners(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn kinds(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    impl CollaborationListener for Recorder {
        fn on_event(&self, event: &CollaborationEvent) {
            self.seen.lock().push(event.kind.as_str().to_string());
        }
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CollaborationListener for Tagged {
        fn on_event(&self, _event: &CollaborationEvent) {
            self.log.lock().push(self.tag);
        }
    }

    struct Panicky;

    impl CollaborationListener for Panicky {
        fn on_event(&self, _event: &CollaborationEvent) {
            panic!("listener blew up");
        }
    }

    fn event(scope: &str, kind: EventKind) -> CollaborationEvent {
        CollaborationEvent::new(kind, scope, "u-1", json!({}))
    }

    #[test]
    fn test_dispatch_reaches_scope_listeners_only() {
        let bus = EventBus::new();
        let a = Recorder::new();
        let b = Recorder::new();
        bus.add_listener("uc-1", a.clone());
        bus.add_listener("uc-2", b.clone());

        bus.emit(&event("uc-1", EventKind::Join));

        assert_eq!(a.kinds(), vec!["join"]);
        assert!(b.kinds().is_empty());
    }

    #[test]
    fn test_dispatch_preserves_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_listener(
            "uc-1",
            Arc::new(Tagged {
                tag: "first",
                log: log.clone(),
            }),
        );
        bus.add_listener(
            "uc-1",
            Arc::new(Tagged {
                tag: "second",
                log: log.clone(),
            }),
        );

        bus.emit(&event("uc-1", EventKind::Comment));

        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_listener_does_not_starve_the_rest() {
        let bus = EventBus::new();
        let survivor = Recorder::new();
        bus.add_listener("uc-1", Arc::new(Panicky));
        bus.add_listener("uc-1", survivor.clone());

        bus.emit(&event("uc-1", EventKind::Comment));

        assert_eq!(survivor.kinds(), vec!["comment"]);
        assert_eq!(bus.stats().listener_failures, 1);
    }

    #[test]
    fn test_remove_listener_by_identity() {
        let bus = EventBus::new();
        let keep = Recorder::new();
        let detach = Recorder::new();
        bus.add_listener("uc-1", keep.clone());
        bus.add_listener("uc-1", detach.clone());

        let handle: Arc<dyn CollaborationListener> = detach.clone();
        assert!(bus.remove_listener("uc-1", &handle));
        assert!(!bus.remove_listener("uc-1", &handle));

        bus.emit(&event("uc-1", EventKind::Join));

        assert_eq!(keep.kinds(), vec!["join"]);
        assert!(detach.kinds().is_empty());
    }

    #[test]
    fn test_same_listener_registered_twice_fires_twice() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.add_listener("uc-1", recorder.clone());
        bus.add_listener("uc-1", recorder.clone());

        bus.emit(&event("uc-1", EventKind::Typing));

        assert_eq!(recorder.kinds().len(), 2);
    }

    #[test]
    fn test_emit_without_listeners_is_harmless() {
        let bus = EventBus::new();
        bus.emit(&event("uc-ghost", EventKind::Typing));

        let stats = bus.stats();
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.registered_listeners, 0);
        assert_eq!(stats.listener_failures, 0);
    }

    #[test]
    fn test_listener_counts() {
        let bus = EventBus::new();
        let a = Recorder::new();
        let b = Recorder::new();
        bus.add_listener("uc-1", a.clone());
        bus.add_listener("uc-1", b.clone());
        bus.add_listener("uc-2", a.clone());

        assert_eq!(bus.listener_count("uc-1"), 2);
        assert_eq!(bus.listener_count("uc-404"), 0);
        assert_eq!(bus.total_listeners(), 3);

        let handle: Arc<dyn CollaborationListener> = b;
        bus.remove_listener("uc-1", &handle);
        assert_eq!(bus.total_listeners(), 2);
    }
}
