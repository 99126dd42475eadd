//! Tokio time effect handler

use async_trait::async_trait;
use chainstate_core::effects::PhysicalTimeEffects;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Monotonic clock backed by `tokio::time`.
///
/// Readings are milliseconds since the handler was created. Because it uses
/// tokio's clock, `tokio::time::pause` and `#[tokio::test(start_paused = true)]`
/// control it.
#[derive(Debug, Clone)]
pub struct TokioTimeHandler {
    origin: Instant,
}

impl TokioTimeHandler {
    /// Create a handler whose origin is now. Must be called inside a runtime
    /// when the tokio clock is paused.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioTimeHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PhysicalTimeEffects for TokioTimeHandler {
    fn now_ms(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        elapsed.as_millis().try_into().unwrap_or(u64::MAX)
    }

    async fn sleep_ms(&self, ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_paused_clock_advances_with_sleep() {
        let clock = TokioTimeHandler::new();
        assert_eq!(clock.now_ms(), 0);

        clock.sleep_ms(250).await;
        let now = clock.now_ms();
        assert!((250..260).contains(&now), "clock read {now}");
    }
}
