use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

pub const DEFAULT_TIME_LIMIT_SECONDS: u64 = 1800;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerState {
    pub time_limit_seconds: u64,
    pub remaining_seconds: u64,
    pub elapsed_seconds: u64,
    pub expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running(u64),
    /// This tick brought the clock to zero. Reported exactly once.
    Expired,
    /// Already at zero before the tick.
    Finished,
}

/// Exam countdown in whole seconds. Never goes below zero.
#[derive(Debug, Clone)]
pub struct Countdown {
    time_limit: u64,
    remaining: u64,
}

impl Countdown {
    pub fn new(time_limit_seconds: u64) -> Self {
        Self {
            time_limit: time_limit_seconds,
            remaining: time_limit_seconds,
        }
    }

    /// Picks the backend-declared limit, falling back when it is absent or zero.
    pub fn resolve_limit(declared: Option<u64>, fallback: u64) -> u64 {
        match declared {
            Some(limit) if limit > 0 => limit,
            _ if fallback > 0 => fallback,
            _ => DEFAULT_TIME_LIMIT_SECONDS,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        match self.remaining {
            0 => TickOutcome::Finished,
            1 => {
                self.remaining = 0;
                TickOutcome::Expired
            }
            n => {
                self.remaining = n - 1;
                TickOutcome::Running(self.remaining)
            }
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            time_limit_seconds: self.time_limit,
            remaining_seconds: self.remaining,
            elapsed_seconds: self.time_limit - self.remaining,
            expired: self.is_expired(),
        }
    }
}

/// `m:ss`, as shown next to the exam.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Background task calling `on_tick` once per period until it asks to stop.
///
/// The task is aborted when the `Ticker` is dropped, so holding it in the
/// owner of the session ties the ticks to that owner's lifetime.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if on_tick().await == TickControl::Stop {
                    debug!("⏹️ Ticker stopped by its callback");
                    break;
                }
            }
        });
        info!("⏱️ Countdown ticker started ({}ms period)", period.as_millis());
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("🧹 Cancelling countdown ticker");
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_countdown_clamps_at_zero() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.tick(), TickOutcome::Running(2));
        assert_eq!(countdown.tick(), TickOutcome::Running(1));
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        assert_eq!(countdown.tick(), TickOutcome::Finished);
        assert_eq!(countdown.tick(), TickOutcome::Finished);
        assert_eq!(countdown.remaining(), 0);
        assert_eq!(countdown.state().elapsed_seconds, 3);
    }

    #[test]
    fn test_zero_limit_is_already_finished() {
        let mut countdown = Countdown::new(0);
        assert!(countdown.is_expired());
        assert_eq!(countdown.tick(), TickOutcome::Finished);
    }

    #[test]
    fn test_resolve_limit() {
        assert_eq!(Countdown::resolve_limit(Some(600), 1800), 600);
        assert_eq!(Countdown::resolve_limit(Some(0), 1800), 1800);
        assert_eq!(Countdown::resolve_limit(None, 900), 900);
        assert_eq!(Countdown::resolve_limit(None, 0), DEFAULT_TIME_LIMIT_SECONDS);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1800), "30:00");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(0), "0:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_asked() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let ticker = Ticker::spawn(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    TickControl::Stop
                } else {
                    TickControl::Continue
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(ticker.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_ticker_cancels_ticks() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let ticker = Ticker::spawn(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(ticker);
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert_eq!(seen, 2);
    }
}
