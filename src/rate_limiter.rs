use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Global dispatch throttle: consecutive requests, from any worker, start at least `delay` apart.
pub struct RateLimiter {
    next_slot: Arc<Mutex<Option<Instant>>>,
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            next_slot: Arc::new(Mutex::new(None)),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn wait_if_needed(&self) {
        if self.delay.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.delay);
            slot
        }; // Release lock before sleeping

        tokio::time::sleep_until(slot).await;
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            next_slot: self.next_slot.clone(),
            delay: self.delay,
        }
    }
}
