//! Error types for locator system

use device_adapter::AdapterError;
use mobiflow_core_types::Backend;
use thiserror::Error;

use crate::types::AttemptedCandidate;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Selector type has no rule for the requested backend
    #[error("Unsupported selector type '{selector_type}' for {backend}")]
    UnsupportedSelector {
        selector_type: String,
        backend: Backend,
    },

    /// Backend name is not one of the known frameworks
    #[error("Unsupported framework: {0}")]
    UnsupportedFramework(String),

    /// Every candidate and healing strategy was exhausted
    #[error("Element '{locator_key}' not found after {} candidate(s): {}", .attempted.len(), format_attempts(.attempted))]
    ElementNotFound {
        locator_key: String,
        attempted: Vec<AttemptedCandidate>,
    },

    /// Locator definition rejected at load time
    #[error("Invalid locator '{key}': {reason}")]
    InvalidLocator { key: String, reason: String },

    /// Unknown locator key referenced by a step
    #[error("Unknown locator key: {0}")]
    UnknownLocator(String),

    /// Healing configuration rejected at load time
    #[error("Invalid healing config: {0}")]
    InvalidHealingConfig(String),

    /// Device communication error that is not a plain miss
    #[error("Device error: {0}")]
    Adapter(#[from] AdapterError),

    /// Cancelled by an external signal
    #[error("Resolution cancelled")]
    Cancelled,
}

fn format_attempts(attempted: &[AttemptedCandidate]) -> String {
    attempted
        .iter()
        .map(|a| format!("{}={}", a.selector_type, a.value))
        .collect::<Vec<_>>()
        .join(", ")
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::ElementNotFound { .. } => true,
            LocatorError::Adapter(err) => err.retriable,
            _ => false,
        }
    }

    /// Failures that do not describe the element at all
    pub fn is_unclassified(&self) -> bool {
        match self {
            LocatorError::Adapter(err) => !err.retriable,
            LocatorError::Cancelled => true,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Adapter(err) if !err.retriable => 3,
            LocatorError::Adapter(_) | LocatorError::Cancelled => 2,
            LocatorError::ElementNotFound { .. } => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_adapter::AdapterErrorKind;

    #[test]
    fn not_found_lists_attempts_in_order() {
        let err = LocatorError::ElementNotFound {
            locator_key: "login_button".to_string(),
            attempted: vec![
                AttemptedCandidate::new("id", "com.app:id/login"),
                AttemptedCandidate::new("text", "Login"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Element 'login_button' not found after 2 candidate(s): id=com.app:id/login, text=Login"
        );
        assert!(err.is_retryable());
        assert!(!err.is_unclassified());
    }

    #[test]
    fn adapter_errors_follow_retriable_flag() {
        let io: LocatorError = AdapterError::new(AdapterErrorKind::DeviceIo).into();
        assert!(io.is_retryable());
        assert_eq!(io.severity(), 2);

        let internal: LocatorError = AdapterError::new(AdapterErrorKind::Internal).into();
        assert!(!internal.is_retryable());
        assert!(internal.is_unclassified());
        assert_eq!(internal.severity(), 3);
    }
}
