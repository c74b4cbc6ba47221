//! Error types for assertion watching

use action_locator::LocatorError;
use thiserror::Error;

use crate::types::ObservedState;

/// Gate error enumeration
#[derive(Debug, Error, Clone)]
pub enum GateError {
    /// Deadline passed before the condition held
    #[error("Assertion '{assertion}' on '{locator_key}' timed out after {waited_ms}ms ({polls} poll(s)); last observed: {last_observed}")]
    AssertionTimeout {
        assertion: String,
        locator_key: String,
        waited_ms: u64,
        polls: u32,
        last_observed: ObservedState,
    },

    /// Malformed assertion parameters or watch options
    #[error("Invalid assertion spec: {0}")]
    InvalidSpec(String),

    /// Assertion references a locator the catalog does not define
    #[error("Unknown locator key: {0}")]
    UnknownLocator(String),

    /// Resolution failed for a reason other than a plain miss
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Cancelled by an external signal
    #[error("Assertion cancelled: {0}")]
    Cancelled(String),
}

impl GateError {
    /// Check if error is retryable
    ///
    /// A timed-out assertion already spent its whole budget waiting, so it is
    /// never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            GateError::Locator(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Failures that say nothing about the asserted condition
    pub fn is_unclassified(&self) -> bool {
        match self {
            GateError::Locator(err) => err.is_unclassified(),
            GateError::Cancelled(_) => true,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            GateError::Locator(err) => err.severity(),
            GateError::Cancelled(_) | GateError::InvalidSpec(_) => 2,
            GateError::AssertionTimeout { .. } | GateError::UnknownLocator(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_adapter::{AdapterError, AdapterErrorKind};

    #[test]
    fn timeout_message_carries_last_observation() {
        let err = GateError::AssertionTimeout {
            assertion: "element_appears_with_text".into(),
            locator_key: "status".into(),
            waited_ms: 3000,
            polls: 4,
            last_observed: ObservedState {
                present: true,
                text: Some("Pending".into()),
                ..ObservedState::default()
            },
        };
        let message = err.to_string();
        assert!(message.contains("after 3000ms (4 poll(s))"));
        assert!(message.contains("text=\"Pending\""));
        assert!(!err.is_retryable());
        assert!(!err.is_unclassified());
    }

    #[test]
    fn device_failures_are_unclassified() {
        let err = GateError::from(LocatorError::Adapter(
            AdapterError::new(AdapterErrorKind::Internal).retriable(false),
        ));
        assert!(err.is_unclassified());
        assert_eq!(err.severity(), 3);
        assert!(GateError::Cancelled("test timeout".into()).is_unclassified());
    }
}
