use proctor_storage::SessionStatus;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Countdown cadence driver, armed only while the session is active.
///
/// Disarming drops the underlying interval, so no tick can fire after
/// the session leaves `Active`.
#[derive(Debug)]
pub struct SessionTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl SessionTimer {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Arm or disarm according to the supervisor's status
    pub fn sync(&mut self, status: SessionStatus) {
        match (status, self.interval.is_some()) {
            (SessionStatus::Active, false) => {
                let mut interval = interval_at(Instant::now() + self.period, self.period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.interval = Some(interval);
                log::debug!("Session timer armed ({:?})", self.period);
            }
            (SessionStatus::Active, true) | (_, false) => {}
            (_, true) => {
                self.interval = None;
                log::debug!("Session timer stopped ({status:?})");
            }
        }
    }

    /// Cancel any scheduled tick
    pub fn cancel(&mut self) {
        self.interval = None;
    }

    /// Wait for the next tick. Never resolves while disarmed.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
