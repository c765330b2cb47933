//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Runtime helpers supporting the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Simple async rate limiter that ensures deterministic loop intervals.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// One-shot deadline armed by states that wait for a settle delay.
///
/// An unarmed timer never fires, so it can sit in a `select!` branch unconditionally.
#[derive(Debug, Default)]
pub struct SettleTimer {
    deadline: Option<Instant>,
}

impl SettleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for an absolute deadline.
    pub fn arm(&mut self, deadline: std::time::Instant) {
        self.deadline = Some(Instant::from_std(deadline));
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the armed deadline and disarm. Pends forever when unarmed.
    pub async fn expired(&mut self) -> Instant {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
                deadline
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn settle_timer_fires_once_at_deadline() {
        let mut timer = SettleTimer::new();
        let start = std::time::Instant::now();
        timer.arm(start + Duration::from_millis(250));
        assert!(timer.is_armed());
        timer.expired().await;
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_timer_never_fires() {
        let mut timer = SettleTimer::new();
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), timer.expired()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_ticks_immediately_then_periodically() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let first = limiter.tick().await;
        let second = limiter.tick().await;
        assert_eq!(second - first, Duration::from_millis(100));
    }
}
