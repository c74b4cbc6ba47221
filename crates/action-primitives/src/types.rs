//! Core data types for action dispatch

use std::time::Duration;

use action_locator::{HealingRecord, ResolveOptions};
use chrono::{DateTime, Utc};
use device_adapter::{DeviceId, Direction, Rect};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context for one action
///
/// Contains the runtime context needed to execute an action:
/// - Device the action runs against
/// - Deadline for timeout enforcement
/// - Cancellation token for cooperative cancellation
/// - Resolution budget for locator lookups made by the action
#[derive(Clone, Debug)]
pub struct ExecCtx {
    pub device_id: DeviceId,

    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Budget for a locator lookup that waits for its element
    pub resolve_timeout: Duration,

    pub poll_interval: Duration,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(device_id: DeviceId, deadline: Instant, cancel_token: CancellationToken) -> Self {
        Self {
            device_id,
            deadline,
            cancel_token,
            resolve_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Waiting lookup, capped by what is left of the deadline.
    pub fn waiting_lookup(&self) -> ResolveOptions {
        ResolveOptions::new(
            self.resolve_timeout.min(self.remaining_time()),
            self.cancel_token.clone(),
        )
        .with_poll_interval(self.poll_interval)
    }

    /// Immediate lookup used between swipes; declared candidates only.
    pub fn probe_lookup(&self) -> ResolveOptions {
        ResolveOptions::single_pass(self.cancel_token.clone()).declared_only()
    }
}

/// Timing knobs of gesture loops
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    /// Pause after each swipe before looking at the screen again
    pub swipe_settle: Duration,
    /// Pause after a pull-to-refresh gesture
    pub refresh_settle: Duration,
    pub swipe_duration_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            swipe_settle: Duration::from_millis(500),
            refresh_settle: Duration::from_secs(1),
            swipe_duration_ms: 500,
        }
    }
}

/// Outcome of a swipe-driven action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureOutcome {
    /// Direction in which the target was reached
    pub direction_used: Option<Direction>,

    /// Swipes performed across all directions
    pub swipes: u32,

    /// Directions tried, in order
    pub attempted_directions: Vec<Direction>,
}

/// A distinct child gathered by `swipe_and_collect_children`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedChild {
    pub identity: String,
    pub text: String,
    pub bounds: Rect,
}

/// Action execution report
///
/// Contains everything the step recorder needs:
/// - Timing information
/// - Healing records of every lookup that did not hit the primary candidate
/// - Gesture outcome and collected children (swipe actions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub action: String,

    /// When the action started
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    /// When the action finished
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    /// Total latency in milliseconds
    pub latency_ms: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub healing: Vec<HealingRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<GestureOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected: Option<Vec<CollectedChild>>,
}

impl ActionReport {
    /// Create a successful action report
    pub fn success(action: impl Into<String>, started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            action: action.into(),
            started_at,
            finished_at: Utc::now(),
            latency_ms,
            healing: Vec::new(),
            gesture: None,
            collected: None,
        }
    }

    pub fn with_healing(mut self, healing: impl IntoIterator<Item = HealingRecord>) -> Self {
        self.healing.extend(healing);
        self
    }

    pub fn with_gesture(mut self, gesture: GestureOutcome) -> Self {
        self.gesture = Some(gesture);
        self
    }

    pub fn with_collected(mut self, collected: Vec<CollectedChild>) -> Self {
        self.collected = Some(collected);
        self
    }
}
