//! Cancellable waits used by crawl workers
//!
//! Every pause a worker takes goes through [`Pacer`], and each one races
//! the worker's cancellation token so a stop request ends it immediately.

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed
    Elapsed,

    /// The token was cancelled first
    Stopped,
}

impl WaitOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Wait durations for one worker
#[derive(Debug, Clone)]
pub struct Pacer {
    idle_wait: Duration,
    pacing_min: Duration,
    pacing_max: Duration,
    cooldown: Duration,
}

impl Pacer {
    pub fn new(
        idle_wait: Duration,
        pacing_min: Duration,
        pacing_max: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            idle_wait,
            pacing_min,
            pacing_max: pacing_max.max(pacing_min),
            cooldown,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.idle_wait(),
            Duration::from_millis(config.pacing_min_ms),
            Duration::from_millis(config.pacing_max_ms),
            config.cooldown(),
        )
    }

    pub fn idle_wait(&self) -> Duration {
        self.idle_wait
    }

    pub fn cooldown_duration(&self) -> Duration {
        self.cooldown
    }

    /// Pause while the frontier is empty
    ///
    /// `limit` shortens the pause so a worker can notice a drain deadline
    /// without oversleeping it.
    pub async fn idle(&self, token: &CancellationToken, limit: Option<Duration>) -> WaitOutcome {
        let duration = match limit {
            Some(limit) => self.idle_wait.min(limit),
            None => self.idle_wait,
        };
        wait(duration, token).await
    }

    /// Randomized pause after a successful fetch
    pub async fn pace(&self, token: &CancellationToken) -> WaitOutcome {
        let delay = self.jitter();
        wait(delay, token).await
    }

    /// Pause after the remote source signaled throttling
    pub async fn cooldown(&self, token: &CancellationToken) -> WaitOutcome {
        wait(self.cooldown, token).await
    }

    /// Picks a delay uniformly from the pacing range
    pub fn jitter(&self) -> Duration {
        if self.pacing_max <= self.pacing_min {
            return self.pacing_min;
        }
        let min = self.pacing_min.as_millis() as u64;
        let max = self.pacing_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Sleeps for `duration` unless `token` is cancelled first
pub async fn wait(duration: Duration, token: &CancellationToken) -> WaitOutcome {
    if duration.is_zero() {
        return if token.is_cancelled() {
            WaitOutcome::Stopped
        } else {
            WaitOutcome::Elapsed
        };
    }

    tokio::select! {
        _ = token.cancelled() => WaitOutcome::Stopped,
        _ = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
    }
}
