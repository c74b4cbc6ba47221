//! Error types for action dispatch

use action_locator::LocatorError;
use device_adapter::{AdapterError, Direction};
use thiserror::Error;

fn join_directions(directions: &[Direction]) -> String {
    directions
        .iter()
        .map(Direction::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error types for action dispatch
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Missing or ill-typed parameter; raised before any UI interaction
    #[error("Invalid parameters for '{action}': {reason}")]
    ActionParameter { action: String, reason: String },

    /// Gesture fallback exhausted every direction
    #[error(
        "Target '{target}' not found after {swipes_performed} swipe(s) (directions: {})",
        join_directions(.attempted_directions)
    )]
    TargetNotFound {
        target: String,
        attempted_directions: Vec<Direction>,
        swipes_performed: u32,
    },

    /// Target never left the screen within `max_swipe`
    #[error("Target '{target}' still visible after {swipes_performed} swipe(s)")]
    TargetStillVisible { target: String, swipes_performed: u32 },

    /// Element resolution failed
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Device rejected or failed the operation
    #[error("Device error: {0}")]
    Adapter(#[from] AdapterError),

    /// Action deadline passed mid-way
    #[error("Action timeout: {0}")]
    Timeout(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Cancelled(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn parameter(action: impl Into<String>, reason: impl Into<String>) -> Self {
        ActionError::ActionParameter {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::Locator(err) => err.is_retryable(),
            ActionError::Adapter(err) => err.retriable,
            ActionError::TargetNotFound { .. }
            | ActionError::TargetStillVisible { .. }
            | ActionError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Failures the step policy cannot reason about; they abort the test.
    pub fn is_unclassified(&self) -> bool {
        match self {
            ActionError::Locator(err) => err.is_unclassified(),
            ActionError::Adapter(err) => !err.retriable,
            ActionError::Cancelled(_) | ActionError::Internal(_) => true,
            _ => false,
        }
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) => 3,
            ActionError::Adapter(_) | ActionError::Cancelled(_) => 2,
            ActionError::Locator(err) => err.severity(),
            ActionError::TargetNotFound { .. }
            | ActionError::TargetStillVisible { .. }
            | ActionError::Timeout(_) => 1,
            ActionError::ActionParameter { .. } => 0,
        }
    }
}
