//! Cancellable timers owned by the session driver.
//!
//! Both are driven from the driver's select loop and cancelled by `cancel()`
//! or by dropping. They run on tokio's clock, so tests can pause and advance
//! virtual time.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};

/// One-shot timer.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub(crate) fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(after)));
    }

    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Completes when the armed deadline passes and disarms the timer.
    /// Never completes while disarmed.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}

/// Repeating timer whose first tick comes one period after `start`.
#[derive(Debug, Default)]
pub(crate) struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub(crate) fn start(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub(crate) fn stop(&mut self) {
        self.interval = None;
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => pending().await,
        }
    }
}
