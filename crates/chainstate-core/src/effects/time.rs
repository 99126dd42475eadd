//! Clock effects used by the commit scheduler.
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `chainstate-effects::TokioTimeHandler`
//!
//! `now_ms` is monotonic and only meaningful relative to other readings from
//! the same handler. Window deadlines are measured with it.

use async_trait::async_trait;

/// Monotonic clock and sleep used to time commit windows.
///
/// Production code uses `TokioTimeHandler`; tests drive it with tokio's
/// paused clock.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Monotonic milliseconds since an arbitrary per-handler origin.
    fn now_ms(&self) -> u64;

    /// Suspend for `ms` milliseconds.
    async fn sleep_ms(&self, ms: u64);
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    async fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms).await
    }
}
