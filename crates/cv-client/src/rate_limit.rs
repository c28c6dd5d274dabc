//! Request pacing primitives: a continuously refilling token bucket and a
//! bounded concurrency gate.
//!
//! Both are independently owned values composed by the client façade; per
//! request the gate is acquired first, then a token. Gate slots are released
//! when the request finishes (success or failure); spent tokens are not
//! returned.

use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};

/// Poll interval while waiting for a token.
const TOKEN_POLL: Duration = Duration::from_millis(25);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with capacity `requests_per_minute` and continuous refill
/// at `requests_per_minute / 60_000` tokens per millisecond. Starts full.
pub struct TokenBucket {
    capacity: f64,
    refill_per_ms: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f64;
        Self {
            capacity,
            refill_per_ms: capacity / 60_000.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Suspend until at least one token is available, then consume it.
    pub async fn take(&self) {
        loop {
            if self.try_take() {
                return;
            }
            sleep(TOKEN_POLL).await;
        }
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket lock poisoned");
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_refill).as_secs_f64() * 1_000.0;
        state.tokens = (state.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// At most `max_concurrent` in-flight requests; acquire suspends until a
/// slot frees. The returned permit releases its slot on drop.
pub struct ConcurrencyGate {
    sem: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.sem)
            .acquire_owned()
            .await
            .expect("concurrency gate semaphore closed")
    }
}
