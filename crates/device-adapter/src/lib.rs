//! Device capability layer.
//!
//! The engine never talks to Appium or UIAutomator2 directly. Everything it
//! needs from a device (element queries, geometry, gestures, text entry and
//! device control) goes through [`DeviceAdapter`]. Driver bindings implement
//! it; [`sim::SimulatedDevice`] implements it in memory for tests and dry runs.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod adapter;
pub mod sim;
pub mod xpath;

pub use adapter::{DeviceAdapter, DeviceControl, ElementProbe, Gesture, TextInputOptions};
pub use error::{AdapterError, AdapterErrorKind};
pub use mobiflow_core_types::{Backend, DeviceId, Direction, Rect};

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("stale element")]
        StaleElement,
        #[error("query not supported by this device")]
        UnsupportedQuery,
        #[error("invalid query")]
        InvalidQuery,
        #[error("device i/o failure")]
        DeviceIo,
        #[error("operation timed out")]
        Timeout,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            let retriable = matches!(
                kind,
                AdapterErrorKind::StaleElement
                    | AdapterErrorKind::DeviceIo
                    | AdapterErrorKind::Timeout
            );
            Self {
                kind,
                hint: None,
                retriable,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        /// A query shape the device cannot evaluate; callers treat it as a miss.
        pub fn is_unsupported(&self) -> bool {
            matches!(
                self.kind,
                AdapterErrorKind::UnsupportedQuery | AdapterErrorKind::InvalidQuery
            )
        }
    }
}

/// Backend-specific query produced by the selector transformer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendQuery {
    /// Appium `find_element(by, value)`.
    Appium { by: String, value: String },
    /// UIAutomator2 `device(**{kwarg: value})`.
    Uiautomator2 { kwarg: String, value: String },
}

impl BackendQuery {
    pub fn appium(by: impl Into<String>, value: impl Into<String>) -> Self {
        BackendQuery::Appium {
            by: by.into(),
            value: value.into(),
        }
    }

    pub fn uiautomator2(kwarg: impl Into<String>, value: impl Into<String>) -> Self {
        BackendQuery::Uiautomator2 {
            kwarg: kwarg.into(),
            value: value.into(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            BackendQuery::Appium { .. } => Backend::Appium,
            BackendQuery::Uiautomator2 { .. } => Backend::Uiautomator2,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            BackendQuery::Appium { value, .. } | BackendQuery::Uiautomator2 { value, .. } => value,
        }
    }
}

impl fmt::Display for BackendQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendQuery::Appium { by, value } => write!(f, "appium({by}={value})"),
            BackendQuery::Uiautomator2 { kwarg, value } => write!(f, "u2({kwarg}={value})"),
        }
    }
}

/// Opaque reference to an element located on the device.
///
/// `key` is the backend's stable identity for the node; `ordinal` is its
/// position in the current hierarchy traversal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub key: String,
    pub ordinal: usize,
}

impl ElementHandle {
    pub fn new(key: impl Into<String>, ordinal: usize) -> Self {
        Self {
            key: key.into(),
            ordinal,
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_defaults_follow_kind() {
        let stale = AdapterError::new(AdapterErrorKind::StaleElement).with_hint("login_btn");
        assert!(stale.retriable);
        assert_eq!(stale.to_string(), "stale element: login_btn");

        let internal = AdapterError::new(AdapterErrorKind::Internal);
        assert!(!internal.retriable);
        assert!(!internal.is_unsupported());
        assert!(AdapterError::new(AdapterErrorKind::UnsupportedQuery).is_unsupported());
    }

    #[test]
    fn query_reports_backend() {
        let q = BackendQuery::uiautomator2("resourceId", "com.app:id/login_btn");
        assert_eq!(q.backend(), Backend::Uiautomator2);
        assert_eq!(q.value(), "com.app:id/login_btn");
        assert_eq!(q.to_string(), "u2(resourceId=com.app:id/login_btn)");
    }
}
