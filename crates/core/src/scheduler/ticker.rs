//! Fixed-interval heartbeat, generalized from the teacher's
//! `LoopScheduler` (interval + jitter) with jitter dropped: the scheduler's
//! cadence is an operational contract (pattern detection every N ticks,
//! etc.), not a "look organic" concern.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    pub fn new(interval_seconds: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn tick(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_accessor_returns_configured_duration() {
        let ticker = Ticker::new(30);
        assert_eq!(ticker.interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn tick_sleeps_for_at_least_the_interval() {
        let ticker = Ticker::new(0);
        let start = tokio::time::Instant::now();
        ticker.tick().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
