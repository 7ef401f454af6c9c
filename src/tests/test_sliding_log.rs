use std::sync::Arc;

use crate::{MemoryBackend, MockClock, RateLimitBackend};

fn backend() -> (Arc<MockClock>, MemoryBackend) {
    let clock = Arc::new(MockClock::new(0));
    let backend = MemoryBackend::with_clock(clock.clone());
    (clock, backend)
}

#[tokio::test]
async fn admits_by_exact_timestamps() {
    let (clock, backend) = backend();

    for t in [0, 400, 800] {
        clock.set(t);
        let d = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
        assert!(d.allowed, "call at {t}ms should be admitted");
    }

    clock.set(900);
    let denied = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.current_count, Some(3));
    // The oldest entry (t=0) leaves the window at t=1000.
    assert_eq!(denied.reset_at_ms, 1000);
    assert_eq!(denied.retry_after_ms, 100);

    clock.set(1050);
    let d = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.current_count, Some(3));
    assert_eq!(d.remaining, 0);
    // Oldest surviving entry is now t=400.
    assert_eq!(d.reset_at_ms, 1400);
}

#[tokio::test]
async fn first_admission_projects_reset_one_window_out() {
    let (clock, backend) = backend();

    clock.set(250);
    let d = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.current_count, Some(1));
    assert_eq!(d.reset_at_ms, 1250);
}

#[tokio::test]
async fn cost_appends_that_many_entries() {
    let (_clock, backend) = backend();

    let d = backend.sliding_window_log("k", 5, 1000, 3).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.current_count, Some(3));

    let denied = backend.sliding_window_log("k", 5, 1000, 3).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.current_count, Some(3));
    assert_eq!(denied.remaining, 2);
}

#[tokio::test]
async fn denied_calls_leave_the_log_untouched() {
    let (clock, backend) = backend();

    for _ in 0..3 {
        assert!(backend.sliding_window_log("k", 3, 1000, 1).await.unwrap().allowed);
    }

    for _ in 0..5 {
        let denied = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.current_count, Some(3));
    }

    // All three entries expire together.
    clock.set(1001);
    let d = backend.sliding_window_log("k", 3, 1000, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.current_count, Some(1));
}
