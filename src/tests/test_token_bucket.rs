use std::sync::Arc;

use crate::{MemoryBackend, MockClock, RateLimitBackend};

fn backend() -> (Arc<MockClock>, MemoryBackend) {
    let clock = Arc::new(MockClock::new(0));
    let backend = MemoryBackend::with_clock(clock.clone());
    (clock, backend)
}

#[tokio::test]
async fn burst_drains_capacity_then_denies() {
    let (_clock, backend) = backend();

    for i in 0..10 {
        let d = backend.token_bucket("k", 10, 5.0, 1).await.unwrap();
        assert!(d.allowed, "call {i} should be admitted");
        assert_eq!(d.remaining, 9 - i);
        assert_eq!(d.retry_after_ms, 0);
    }

    let denied = backend.token_bucket("k", 10, 5.0, 1).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    // One token at 5/s is 200ms away.
    assert_eq!(denied.retry_after_ms, 200);
    // An empty bucket refills completely in 2s.
    assert_eq!(denied.reset_at_ms, 2000);
}

#[tokio::test]
async fn refill_restores_admission() {
    let (clock, backend) = backend();

    for _ in 0..10 {
        assert!(backend.token_bucket("k", 10, 5.0, 1).await.unwrap().allowed);
    }
    assert!(!backend.token_bucket("k", 10, 5.0, 1).await.unwrap().allowed);

    clock.set(200);
    let d = backend.token_bucket("k", 10, 5.0, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 0);
}

#[tokio::test]
async fn refill_caps_at_capacity() {
    let (clock, backend) = backend();

    assert!(backend.token_bucket("k", 10, 5.0, 1).await.unwrap().allowed);

    clock.set(60_000);
    let d = backend.token_bucket("k", 10, 5.0, 1).await.unwrap();
    assert!(d.allowed);
    // A minute of refill tops out at capacity, not beyond it.
    assert_eq!(d.remaining, 9);
    assert_eq!(d.reset_at_ms, 60_200);
}

#[tokio::test]
async fn cost_charges_multiple_tokens() {
    let (_clock, backend) = backend();

    let d = backend.token_bucket("k", 10, 5.0, 4).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 6);

    let denied = backend.token_bucket("k", 10, 5.0, 7).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_ms, 200);
}

#[tokio::test]
async fn steady_state_admission_tracks_refill_rate() {
    let (clock, backend) = backend();

    // One call every 100ms for 20s against refill=5/s: the refill budget is
    // exactly 100 tokens on top of the initial capacity of 10. Half-token
    // steps are exact in binary, so the count is deterministic.
    let mut admitted = 0;
    for step in 0..=200 {
        clock.set(step * 100);
        if backend.token_bucket("k", 10, 5.0, 1).await.unwrap().allowed {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 110);
}

#[tokio::test]
async fn backward_clock_skew_never_refills() {
    let (clock, backend) = backend();

    clock.set(1000);
    for _ in 0..5 {
        assert!(backend.token_bucket("k", 10, 5.0, 1).await.unwrap().allowed);
    }

    // The clock moves backwards: the stored state is used as-is.
    clock.set(900);
    let d = backend.token_bucket("k", 10, 5.0, 1).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 4);
}
