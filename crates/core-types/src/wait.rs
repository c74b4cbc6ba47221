//! Bounded, cancellable polling cadence shared by the resolver, watcher and
//! gesture loops.
//!
//! A [`Poller`] hands out poll slots: the first slot is immediate, later
//! slots arrive every `interval` until the deadline. The last slot is
//! clamped to the deadline itself, so a condition that stays false costs at
//! most `timeout` of waiting plus the duration of that final check.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::CoreError;

/// Poll cadence (`interval`) and overall budget (`timeout`).
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
    timeout: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, CoreError> {
        if interval.is_zero() {
            return Err(CoreError::InvalidSchedule(
                "check interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    /// Single check, no waiting.
    pub fn once() -> Self {
        Self {
            interval: Duration::from_millis(1),
            timeout: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Why a poller stopped handing out slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStop {
    TimedOut { polls: u32, waited: Duration },
    Cancelled { polls: u32, waited: Duration },
}

impl PollStop {
    pub fn polls(&self) -> u32 {
        match self {
            PollStop::TimedOut { polls, .. } | PollStop::Cancelled { polls, .. } => *polls,
        }
    }

    pub fn waited(&self) -> Duration {
        match self {
            PollStop::TimedOut { waited, .. } | PollStop::Cancelled { waited, .. } => *waited,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollStop::Cancelled { .. })
    }
}

#[derive(Debug)]
pub struct Poller {
    schedule: PollSchedule,
    started: Instant,
    deadline: Instant,
    polls: u32,
    cancel: CancellationToken,
}

impl Poller {
    pub fn start(schedule: PollSchedule, cancel: CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            schedule,
            started,
            deadline: started + schedule.timeout,
            polls: 0,
            cancel,
        }
    }

    /// Waits for the next poll slot and returns its 1-based number.
    pub async fn next(&mut self) -> Result<u32, PollStop> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        if self.polls > 0 {
            let now = Instant::now();
            if now >= self.deadline {
                return Err(PollStop::TimedOut {
                    polls: self.polls,
                    waited: self.elapsed(),
                });
            }

            let nap = self.schedule.interval.min(self.deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep(nap) => {}
            }
        }

        self.polls += 1;
        Ok(self.polls)
    }

    /// Sleeps for `pause` unless cancelled first; does not consume a slot.
    pub async fn pause(&self, pause: Duration) -> Result<(), PollStop> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            _ = sleep(pause) => Ok(()),
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    fn cancelled(&self) -> PollStop {
        PollStop::Cancelled {
            polls: self.polls,
            waited: self.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        assert!(PollSchedule::new(Duration::ZERO, Duration::from_secs(1)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn never_waits_past_deadline_plus_interval() {
        let schedule =
            PollSchedule::new(Duration::from_millis(300), Duration::from_millis(1000)).unwrap();
        let mut poller = Poller::start(schedule, CancellationToken::new());
        let started = Instant::now();

        let stop = loop {
            match poller.next().await {
                Ok(_) => continue,
                Err(stop) => break stop,
            }
        };

        // slots at 0, 300, 600, 900 and the clamped final slot at 1000
        assert_eq!(stop.polls(), 5);
        assert!(!stop.is_cancelled());
        assert!(started.elapsed() <= Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_polls_exactly_once() {
        let mut poller = Poller::start(PollSchedule::once(), CancellationToken::new());
        assert_eq!(poller.next().await, Ok(1));
        assert!(matches!(
            poller.next().await,
            Err(PollStop::TimedOut { polls: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let schedule =
            PollSchedule::new(Duration::from_secs(10), Duration::from_secs(60)).unwrap();
        let mut poller = Poller::start(schedule, token.clone());
        assert_eq!(poller.next().await, Ok(1));

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let stop = poller.next().await.unwrap_err();
        assert!(stop.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
