//! Fixed-interval pacing for Raindrop API calls
//!
//! Raindrop allows up to 120 requests per minute per authenticated user
//! for OAuth clients, i.e. one request every 500ms. The pacer sleeps a
//! fixed delay after every delete call, successful or not, so consecutive
//! calls never exceed that ceiling.

use std::time::Duration;
use tracing::trace;

/// Documented per-user request ceiling
pub const MAX_REQUESTS_PER_MINUTE: u64 = 120;

/// Delay used between delete calls (500ms plus margin)
pub const DEFAULT_DELETE_DELAY: Duration = Duration::from_millis(510);

/// Smallest delay that stays within [`MAX_REQUESTS_PER_MINUTE`]
pub const fn min_delay() -> Duration {
    Duration::from_millis(60_000 / MAX_REQUESTS_PER_MINUTE)
}

/// Sleeps a fixed delay after each paced call
#[derive(Debug, Clone)]
pub struct RequestPacer {
    delay: Duration,
    total_calls: u64,
    total_delay: Duration,
}

impl RequestPacer {
    /// Create a pacer with the default 510ms delay
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DELETE_DELAY)
    }

    /// Create a pacer with a custom delay
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            total_calls: 0,
            total_delay: Duration::ZERO,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record one completed call and wait out the delay
    pub async fn pace(&mut self) {
        self.total_calls += 1;
        trace!("Pacing {:?} after call #{}", self.delay, self.total_calls);
        tokio::time::sleep(self.delay).await;
        self.total_delay += self.delay;
    }

    /// Get statistics about paced calls
    pub fn stats(&self) -> PacerStats {
        PacerStats {
            delay: self.delay,
            total_calls: self.total_calls,
            total_delay: self.total_delay,
        }
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about paced calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacerStats {
    pub delay: Duration,
    pub total_calls: u64,
    pub total_delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_default_delay_respects_ceiling() {
        assert_eq!(min_delay(), Duration::from_millis(500));
        assert!(DEFAULT_DELETE_DELAY >= min_delay());
        assert_eq!(RequestPacer::new().delay(), DEFAULT_DELETE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_sleeps_fixed_delay() {
        let mut pacer = RequestPacer::with_delay(Duration::from_millis(510));

        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(1020));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let mut pacer = RequestPacer::with_delay(Duration::from_millis(100));
        for _ in 0..3 {
            pacer.pace().await;
        }

        let stats = pacer.stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(300));
        assert_eq!(stats.delay, Duration::from_millis(100));
    }
}
