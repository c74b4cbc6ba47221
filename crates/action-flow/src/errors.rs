//! Step execution error types

use action_gate::GateError;
use action_locator::LocatorError;
use action_primitives::ActionError;
use thiserror::Error;

/// Flow execution errors
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// Test definition rejected at load time
    #[error("Test validation failed: {0}")]
    ValidationFailed(String),

    /// A test step names a step id with no definition
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    /// Step neither an action nor an assertion
    #[error("Unknown action or assertion '{name}' in step {step_id}")]
    UnknownAction { step_id: String, name: String },

    /// Action dispatch failed
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Assertion failed or could not be evaluated
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Pre-resolution of an action target failed
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Test-level deadline expired
    #[error("Test timed out after {0}ms")]
    TestTimeout(u64),

    /// Cancelled by an external signal
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Whether re-running the whole step might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Action(err) => err.is_retryable(),
            FlowError::Gate(err) => err.is_retryable(),
            FlowError::Locator(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Failures that abort the test regardless of step criticality
    pub fn is_unclassified(&self) -> bool {
        match self {
            FlowError::Action(err) => err.is_unclassified(),
            FlowError::Gate(err) => err.is_unclassified(),
            FlowError::Locator(err) => err.is_unclassified(),
            FlowError::TestTimeout(_) | FlowError::Cancelled(_) | FlowError::Internal(_) => true,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            FlowError::Action(err) => err.severity(),
            FlowError::Gate(err) => err.severity(),
            FlowError::Locator(err) => err.severity(),
            FlowError::Internal(_) => 3,
            FlowError::TestTimeout(_) | FlowError::Cancelled(_) => 2,
            _ => 1,
        }
    }

    /// Short machine-readable category for reports
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Action(ActionError::ActionParameter { .. }) => "action_parameter",
            FlowError::Action(ActionError::TargetNotFound { .. }) => "target_not_found",
            FlowError::Action(ActionError::TargetStillVisible { .. }) => "target_still_visible",
            FlowError::Action(ActionError::Locator(err)) | FlowError::Locator(err) => locator_kind(err),
            FlowError::Action(ActionError::Adapter(_)) => "device",
            FlowError::Action(ActionError::Timeout(_)) => "timeout",
            FlowError::Action(ActionError::Cancelled(_))
            | FlowError::Gate(GateError::Cancelled(_))
            | FlowError::Cancelled(_) => "cancelled",
            FlowError::Action(ActionError::Internal(_)) | FlowError::Internal(_) => "internal",
            FlowError::Gate(GateError::AssertionTimeout { .. }) => "assertion_timeout",
            FlowError::Gate(GateError::InvalidSpec(_)) => "invalid_assertion",
            FlowError::Gate(GateError::UnknownLocator(_)) => "unknown_locator",
            FlowError::Gate(GateError::Locator(err)) => locator_kind(err),
            FlowError::TestTimeout(_) => "test_timeout",
            FlowError::ValidationFailed(_)
            | FlowError::UnknownStep(_)
            | FlowError::UnknownAction { .. } => "validation",
        }
    }
}

fn locator_kind(err: &LocatorError) -> &'static str {
    match err {
        LocatorError::ElementNotFound { .. } => "element_not_found",
        LocatorError::UnsupportedSelector { .. } => "unsupported_selector",
        LocatorError::UnknownLocator(_) => "unknown_locator",
        LocatorError::Adapter(_) => "device",
        LocatorError::Cancelled => "cancelled",
        _ => "invalid_locator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_gate::ObservedState;

    #[test]
    fn assertion_timeouts_and_parameter_errors_are_final() {
        let timeout = FlowError::from(GateError::AssertionTimeout {
            assertion: "element_appears".into(),
            locator_key: "toast".into(),
            waited_ms: 1000,
            polls: 3,
            last_observed: ObservedState::absent(),
        });
        assert!(!timeout.is_retryable());
        assert!(!timeout.is_unclassified());
        assert_eq!(timeout.kind(), "assertion_timeout");

        let parameter = FlowError::from(ActionError::parameter("swipe", "'count' must be >= 1"));
        assert!(!parameter.is_retryable());
        assert_eq!(parameter.kind(), "action_parameter");
    }

    #[test]
    fn missing_elements_are_retryable() {
        let err = FlowError::from(LocatorError::ElementNotFound {
            locator_key: "login".into(),
            attempted: vec![],
        });
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "element_not_found");
    }

    #[test]
    fn timeouts_abort() {
        assert!(FlowError::TestTimeout(500).is_unclassified());
        assert!(FlowError::from(ActionError::Cancelled("click".into())).is_unclassified());
    }
}
