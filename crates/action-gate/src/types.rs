//! Core types for the assertion watcher

use std::fmt;
use std::time::Duration;

use action_locator::HealingRecord;
use chrono::{DateTime, Utc};
use device_adapter::Rect;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Poll cadence and deadline for one watch.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub check_interval: Duration,
    pub wait_timeout: Duration,
    pub cancel: CancellationToken,
}

impl WatchOptions {
    pub fn new(check_interval: Duration, wait_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            check_interval,
            wait_timeout,
            cancel,
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
    }
}

/// What one poll saw of the watched element, or of the device for
/// device-state assertions. Only the fields the assertion reads are filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Visible matches of the locator's query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
}

impl ObservedState {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(text: String, bounds: Rect) -> Self {
        Self {
            present: true,
            text: Some(text),
            bounds: Some(bounds),
            ..Self::default()
        }
    }

    /// Every match of a multi-element query; present when there is at least one.
    pub fn matches(texts: Vec<String>) -> Self {
        Self {
            present: !texts.is_empty(),
            count: Some(texts.len()),
            texts,
            ..Self::default()
        }
    }

    pub fn device(app: Option<String>, orientation: String) -> Self {
        Self {
            present: true,
            app,
            orientation: Some(orientation),
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn with_attribute(mut self, value: Option<String>) -> Self {
        self.attribute = value;
        self
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(orientation) = &self.orientation {
            let app = self.app.as_deref().unwrap_or("none");
            return write!(f, "app={app}, orientation={orientation}");
        }
        if let Some(count) = self.count {
            write!(f, "{count} match(es)")?;
            if !self.texts.is_empty() {
                write!(f, ", texts={:?}", self.texts)?;
            }
            return Ok(());
        }
        if !self.present {
            return f.write_str("not present");
        }
        write!(f, "present")?;
        if let Some(text) = &self.text {
            write!(f, ", text={text:?}")?;
        }
        if let Some(bounds) = &self.bounds {
            write!(f, ", bounds={bounds}")?;
        }
        if let Some(enabled) = self.enabled {
            write!(f, ", enabled={enabled}")?;
        }
        if let Some(selected) = self.selected {
            write!(f, ", selected={selected}")?;
        }
        if let Some(value) = &self.attribute {
            write!(f, ", attribute={value:?}")?;
        }
        Ok(())
    }
}

/// Outcome of a satisfied watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchReport {
    pub assertion: String,
    pub locator_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,
    pub waited_ms: u64,
    pub polls: u32,
    pub observed: ObservedState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub healing: Vec<HealingRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_state_display() {
        assert_eq!(ObservedState::absent().to_string(), "not present");
        let seen = ObservedState::present("Done".into(), Rect::new(0, 10, 100, 60));
        assert_eq!(seen.to_string(), "present, text=\"Done\", bounds=[0,10][100,60]");
    }

    #[test]
    fn display_of_counts_and_device_state() {
        let rows = ObservedState::matches(vec!["Milk".into(), "Eggs".into()]);
        assert_eq!(rows.to_string(), "2 match(es), texts=[\"Milk\", \"Eggs\"]");
        assert_eq!(ObservedState::matches(Vec::new()).to_string(), "0 match(es)");
        let device = ObservedState::device(None, "landscape".into());
        assert_eq!(device.to_string(), "app=none, orientation=landscape");
        let flagged = ObservedState::present("Pay".into(), Rect::new(0, 0, 10, 10)).with_enabled(false);
        assert!(flagged.to_string().ends_with(", enabled=false"));
    }

    #[test]
    fn absent_state_serializes_compactly() {
        let value = serde_json::to_value(ObservedState::absent()).unwrap();
        assert_eq!(value, serde_json::json!({"present": false}));
    }
}
