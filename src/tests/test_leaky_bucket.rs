use std::sync::Arc;

use crate::{MemoryBackend, MockClock, RateLimitBackend};

fn backend() -> (Arc<MockClock>, MemoryBackend) {
    let clock = Arc::new(MockClock::new(0));
    let backend = MemoryBackend::with_clock(clock.clone());
    (clock, backend)
}

#[tokio::test]
async fn fills_to_capacity_then_overflows() {
    let (_clock, backend) = backend();

    for i in 0..5 {
        let d = backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap();
        assert!(d.allowed, "call {i} should be admitted");
        assert_eq!(d.retry_after_ms, 0);
    }

    let denied = backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    // One unit over capacity drains at 10/s.
    assert_eq!(denied.retry_after_ms, 100);
    assert_eq!(denied.reset_at_ms, 500);
}

#[tokio::test]
async fn water_drains_over_time() {
    let (clock, backend) = backend();

    for _ in 0..5 {
        assert!(backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap().allowed);
    }
    assert!(!backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap().allowed);

    clock.set(100);
    let d = backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.reset_at_ms, 600);
}

#[tokio::test]
async fn drains_fully_after_long_idle() {
    let (clock, backend) = backend();

    for _ in 0..5 {
        assert!(backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap().allowed);
    }

    clock.set(10_000);
    let d = backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 4);
}

#[tokio::test]
async fn backward_clock_skew_never_drains() {
    let (clock, backend) = backend();

    clock.set(1000);
    for _ in 0..5 {
        assert!(backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap().allowed);
    }

    // The clock moves backwards: no leak is credited.
    clock.set(900);
    let denied = backend.leaky_bucket("k", 5, 10.0, 1).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_ms, 100);
}
