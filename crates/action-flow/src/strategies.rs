//! Failure handling strategies

use tokio::time::Duration;
use tracing::{info, warn};

use crate::errors::FlowError;
use crate::types::StepSettings;

/// Failure handler trait
pub trait FailureHandler: Send + Sync {
    /// Decide what follows a failed attempt (1-based) of a step
    fn handle_failure(
        &self,
        step_id: &str,
        settings: &StepSettings,
        error: &FlowError,
        attempt: u32,
    ) -> FailureHandlerResult;

    /// Check if retry should be attempted
    fn should_retry(&self, settings: &StepSettings, error: &FlowError, attempt: u32) -> bool;

    /// Pause before the next attempt
    fn calculate_backoff(&self, settings: &StepSettings, attempt: u32) -> Duration;
}

/// Result of failure handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureHandlerResult {
    /// Abort the test; remaining steps are skipped
    Abort(String),

    /// Record the failure and continue with the next step
    Continue(String),

    /// Re-run the whole step
    Retry { attempt: u32, backoff_ms: u64 },
}

/// Default policy: retry retryable errors within `retry_attempts`, abort on
/// unclassified errors and blocking steps, continue past non-blocking ones.
pub struct DefaultFailureHandler;

impl DefaultFailureHandler {
    /// Create a new default failure handler
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultFailureHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureHandler for DefaultFailureHandler {
    fn handle_failure(
        &self,
        step_id: &str,
        settings: &StepSettings,
        error: &FlowError,
        attempt: u32,
    ) -> FailureHandlerResult {
        if error.is_unclassified() {
            warn!("Step {} hit an unclassified failure, aborting: {}", step_id, error);
            return FailureHandlerResult::Abort(error.to_string());
        }

        if self.should_retry(settings, error, attempt) {
            let backoff = self.calculate_backoff(settings, attempt);
            info!(
                "Step {} failed (attempt {}/{}), retrying after {}ms: {}",
                step_id,
                attempt,
                settings.retry_attempts + 1,
                backoff.as_millis(),
                error
            );
            return FailureHandlerResult::Retry {
                attempt: attempt + 1,
                backoff_ms: backoff.as_millis() as u64,
            };
        }

        if settings.blocking {
            warn!("Blocking step {} failed, aborting test: {}", step_id, error);
            FailureHandlerResult::Abort(error.to_string())
        } else {
            warn!("Non-blocking step {} failed, continuing: {}", step_id, error);
            FailureHandlerResult::Continue(error.to_string())
        }
    }

    fn should_retry(&self, settings: &StepSettings, error: &FlowError, attempt: u32) -> bool {
        error.is_retryable() && attempt <= settings.retry_attempts
    }

    fn calculate_backoff(&self, settings: &StepSettings, _attempt: u32) -> Duration {
        settings.retry_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionDefaults, StepConfigs};
    use action_gate::{GateError, ObservedState};
    use action_locator::LocatorError;
    use action_primitives::ActionError;

    fn settings(retry_attempts: u32, blocking: bool) -> StepSettings {
        ExecutionDefaults::default().merge(&StepConfigs {
            retry_attempts: Some(retry_attempts),
            retry_delay: Some(250),
            blocking: Some(blocking),
            ..StepConfigs::default()
        })
    }

    fn not_found() -> FlowError {
        FlowError::Locator(LocatorError::ElementNotFound {
            locator_key: "login".into(),
            attempted: vec![],
        })
    }

    #[test]
    fn test_should_retry() {
        let handler = DefaultFailureHandler::new();
        let s = settings(2, true);

        assert!(handler.should_retry(&s, &not_found(), 1));
        assert!(handler.should_retry(&s, &not_found(), 2));
        assert!(!handler.should_retry(&s, &not_found(), 3));

        let parameter = FlowError::from(ActionError::parameter("click", "missing locator_key"));
        assert!(!handler.should_retry(&s, &parameter, 1));
    }

    #[test]
    fn test_handle_failure_retry() {
        let handler = DefaultFailureHandler::new();
        let result = handler.handle_failure("s1", &settings(1, true), &not_found(), 1);
        assert_eq!(
            result,
            FailureHandlerResult::Retry {
                attempt: 2,
                backoff_ms: 250
            }
        );

        let result = handler.handle_failure("s1", &settings(1, true), &not_found(), 2);
        assert!(matches!(result, FailureHandlerResult::Abort(msg) if msg.contains("login")));
    }

    #[test]
    fn test_handle_failure_continue() {
        let handler = DefaultFailureHandler::new();
        let timeout = FlowError::from(GateError::AssertionTimeout {
            assertion: "element_appears".into(),
            locator_key: "toast".into(),
            waited_ms: 500,
            polls: 2,
            last_observed: ObservedState::absent(),
        });

        // assertion timeouts are never retried, even with budget left
        let result = handler.handle_failure("s2", &settings(3, false), &timeout, 1);
        assert!(matches!(result, FailureHandlerResult::Continue(msg) if msg.contains("toast")));
    }

    #[test]
    fn test_handle_failure_abort_unclassified() {
        let handler = DefaultFailureHandler::new();
        let result = handler.handle_failure(
            "s3",
            &settings(3, false),
            &FlowError::Cancelled("shutdown".into()),
            1,
        );
        assert!(matches!(result, FailureHandlerResult::Abort(_)));
    }
}
