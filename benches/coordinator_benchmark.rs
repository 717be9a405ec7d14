//! Benchmarks for the collaboration coordinator's hot paths.
//!
//! Presence updates dominate real traffic (every pointer move from every
//! connected client lands here), so those are measured first, followed by
//! the roster-sized read path, comment append, and event fan-out.
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use collab_coordinator::{
    CollaborationCoordinator, CollaborationEvent, CollaborationListener, CollaborationUser,
    CommentDraft, UserRole,
};

struct NoopListener;

impl CollaborationListener for NoopListener {
    fn on_event(&self, _event: &CollaborationEvent) {}
}

fn user(n: usize) -> CollaborationUser {
    CollaborationUser::new(
        format!("u-{n}"),
        format!("User {n}"),
        format!("user{n}@example.com"),
        UserRole::Editor,
    )
}

/// Coordinator with one scope and `n` joined users.
fn coordinator_with_users(rt: &Runtime, n: usize) -> CollaborationCoordinator {
    let coordinator = CollaborationCoordinator::new();
    rt.block_on(async {
        coordinator.create_session("uc-bench", user(0)).await;
        for i in 1..n {
            coordinator.join_session("uc-bench", user(i)).await;
        }
    });
    coordinator
}

fn bench_cursor_update(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = coordinator_with_users(&rt, 1);

    c.bench_function("cursor_update", |b| {
        b.iter(|| {
            rt.block_on(coordinator.update_cursor(
                "uc-bench",
                "u-0",
                "User 0",
                black_box(120.5),
                black_box(340.25),
                Some("summary"),
            ));
        });
    });
}

fn bench_active_cursors_100_users(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = coordinator_with_users(&rt, 100);
    rt.block_on(async {
        for i in 0..100 {
            coordinator
                .update_cursor("uc-bench", &format!("u-{i}"), &format!("User {i}"), i as f64, 0.0, None)
                .await;
        }
    });

    c.bench_function("active_cursors_100_users", |b| {
        b.iter(|| {
            let cursors = rt.block_on(coordinator.active_cursors(black_box("uc-bench")));
            black_box(cursors)
        });
    });
}

fn bench_comment_append(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = coordinator_with_users(&rt, 2);

    c.bench_function("comment_append", |b| {
        b.iter(|| {
            let comment = rt.block_on(coordinator.add_comment(
                "uc-bench",
                CommentDraft::new(user(1), black_box("flagging this paragraph")),
            ));
            black_box(comment)
        });
    });
}

fn bench_event_dispatch_50_listeners(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = coordinator_with_users(&rt, 1);
    for _ in 0..50 {
        coordinator.add_event_listener("uc-bench", Arc::new(NoopListener));
    }

    c.bench_function("event_dispatch_50_listeners", |b| {
        b.iter(|| {
            rt.block_on(coordinator.update_cursor(
                "uc-bench",
                "u-0",
                "User 0",
                black_box(1.0),
                black_box(2.0),
                None,
            ));
        });
    });
}

fn bench_join_leave_churn(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = coordinator_with_users(&rt, 1);

    c.bench_function("join_leave_churn", |b| {
        b.iter(|| {
            rt.block_on(async {
                coordinator.join_session("uc-bench", black_box(user(1))).await;
                coordinator.leave_session("uc-bench", "u-1").await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_cursor_update,
    bench_active_cursors_100_users,
    bench_comment_append,
    bench_event_dispatch_50_listeners,
    bench_join_leave_churn
);
criterion_main!(benches);
