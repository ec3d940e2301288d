//! Waiting between remote writes.

use std::time::Duration;

use async_trait::async_trait;

/// Why the engine is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Fixed gap between pushable items
    Throttle,
    /// Backoff after a rate-limit signal
    Backoff,
}

/// Suspension point used for throttle and backoff waits
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration, reason: WaitReason);
}

/// `Sleeper` on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, _reason: WaitReason) {
        tokio::time::sleep(duration).await;
    }
}

/// Inter-item throttle; the first pushable item of a batch goes through
/// without waiting.
#[derive(Debug)]
pub struct Throttle {
    delay: Duration,
    primed: bool,
}

impl Throttle {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: false,
        }
    }

    /// Wait for the next slot
    pub async fn wait(&mut self, sleeper: &dyn Sleeper) {
        if self.primed && !self.delay.is_zero() {
            sleeper.sleep(self.delay, WaitReason::Throttle).await;
        }
        self.primed = true;
    }
}
