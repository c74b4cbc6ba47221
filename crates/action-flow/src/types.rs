//! Core types for step execution

use std::collections::HashSet;
use std::time::Duration;

use action_gate::{AssertionSpec, ObservedState};
use action_locator::{HealingRecord, LocatorCatalog};
use action_primitives::{ActionSpec, CollectedChild, GestureOutcome};
use chrono::{DateTime, Utc};
use device_adapter::{Backend, DeviceId};
use mobiflow_core_types::RunId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlowError;

/// Per-step overrides of the execution defaults. Durations in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepConfigs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
}

/// Global defaults a step's configs are merged over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionDefaults {
    /// Budget for an action step, including target resolution.
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub check_interval: Duration,
    pub wait_timeout: Duration,
    pub blocking: bool,
    /// Budget for a whole test case.
    pub test_timeout: Duration,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_attempts: 0,
            retry_delay: Duration::from_secs(2),
            check_interval: Duration::from_millis(500),
            wait_timeout: Duration::from_secs(30),
            blocking: true,
            test_timeout: Duration::from_secs(600),
        }
    }
}

/// Effective settings for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSettings {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub check_interval: Duration,
    pub wait_timeout: Duration,
    pub blocking: bool,
}

impl ExecutionDefaults {
    pub fn merge(&self, configs: &StepConfigs) -> StepSettings {
        let ms = Duration::from_millis;
        StepSettings {
            timeout: configs.timeout.map(ms).unwrap_or(self.timeout),
            retry_attempts: configs.retry_attempts.unwrap_or(self.retry_attempts),
            retry_delay: configs.retry_delay.map(ms).unwrap_or(self.retry_delay),
            check_interval: configs.check_interval.map(ms).unwrap_or(self.check_interval),
            wait_timeout: configs.wait_timeout.map(ms).unwrap_or(self.wait_timeout),
            blocking: configs.blocking.unwrap_or(self.blocking),
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepKind {
    Action(ActionSpec),
    Assert(AssertionSpec),
}

impl StepKind {
    /// Builds an action or assertion from its step name and parameters.
    pub fn parse(step_id: &str, name: &str, params: &Value) -> Result<Self, FlowError> {
        if ActionSpec::is_action(name) {
            Ok(StepKind::Action(ActionSpec::parse(name, params)?))
        } else if AssertionSpec::is_assertion(name) {
            Ok(StepKind::Assert(AssertionSpec::parse(name, params)?))
        } else {
            Err(FlowError::UnknownAction {
                step_id: step_id.to_string(),
                name: name.to_string(),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Action(action) => action.name(),
            StepKind::Assert(assertion) => assertion.name(),
        }
    }

    /// Element the step targets directly, if any.
    pub fn locator_key(&self) -> Option<&str> {
        match self {
            StepKind::Action(action) => action.locator_key(),
            StepKind::Assert(assertion) => assertion.locator_key(),
        }
    }

    pub fn referenced_locators(&self) -> Vec<&str> {
        match self {
            StepKind::Action(action) => action.referenced_locators(),
            StepKind::Assert(assertion) => assertion.locator_key().into_iter().collect(),
        }
    }
}

/// One step of a test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDefinition {
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub kind: StepKind,
    pub configs: StepConfigs,
}

impl StepDefinition {
    pub fn new(step_id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            step_id: step_id.into(),
            name: String::new(),
            description: String::new(),
            kind,
            configs: StepConfigs::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_configs(mut self, configs: StepConfigs) -> Self {
        self.configs = configs;
        self
    }

    pub fn locator_key(&self) -> Option<&str> {
        self.kind.locator_key()
    }
}

/// An ordered list of steps run against one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCase {
    pub test_id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub steps: Vec<StepDefinition>,
}

impl TestCase {
    pub fn new(test_id: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            test_id: test_id.into(),
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            steps,
        }
    }

    /// Checks the test against the locators it will run with.
    pub fn validate(&self, catalog: &LocatorCatalog) -> Result<(), FlowError> {
        if self.test_id.trim().is_empty() {
            return Err(FlowError::ValidationFailed("test_id cannot be empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(FlowError::ValidationFailed(format!(
                "test '{}' has no steps",
                self.test_id
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                return Err(FlowError::ValidationFailed(format!(
                    "test '{}' has a step without step_id",
                    self.test_id
                )));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(FlowError::ValidationFailed(format!(
                    "duplicate step_id '{}' in test '{}'",
                    step.step_id, self.test_id
                )));
            }
            if step.configs.check_interval == Some(0) {
                return Err(FlowError::ValidationFailed(format!(
                    "step '{}': check_interval must be greater than zero",
                    step.step_id
                )));
            }
            for key in step.kind.referenced_locators() {
                if !catalog.contains(key) {
                    return Err(FlowError::ValidationFailed(format!(
                        "step '{}' references unknown locator '{}'",
                        step.step_id, key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "PASSED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Aborted,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Running => "RUNNING",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed | TestStatus::Aborted)
    }
}

/// Step execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub name: String,
    /// Action or assertion name
    pub step_type: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub healing: Vec<HealingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<GestureOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected: Option<Vec<CollectedChild>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<ObservedState>,
}

impl StepResult {
    pub fn new(step: &StepDefinition) -> Self {
        let now = Utc::now();
        Self {
            step_id: step.step_id.clone(),
            name: step.name.clone(),
            step_type: step.kind.name().to_string(),
            status: StepStatus::Passed,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            attempts: 0,
            error: None,
            error_kind: None,
            healing: Vec::new(),
            gesture: None,
            collected: None,
            observed: None,
        }
    }

    pub fn skipped(step: &StepDefinition) -> Self {
        let mut result = Self::new(step);
        result.status = StepStatus::Skipped;
        result
    }

    pub fn with_error(mut self, error: &FlowError) -> Self {
        self.status = StepStatus::Failed;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
        self
    }

    /// Set finish time and calculate duration
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self
    }
}

/// Test execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub run_id: String,
    pub test_id: String,
    pub name: String,
    pub device_id: String,
    pub backend: String,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn new(run_id: &RunId, test: &TestCase, device_id: &DeviceId, backend: Backend) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            test_id: test.test_id.clone(),
            name: test.name.clone(),
            device_id: device_id.to_string(),
            backend: backend.as_str().to_string(),
            status: TestStatus::Pending,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Appends a finished step; recorded steps are never rewritten.
    pub fn push_step(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn finish(&mut self, status: TestStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at).num_milliseconds().max(0) as u64;
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOCATORS: &str = r#"
login:
  primary: { type: id, value: "com.app:id/login" }
"#;

    fn click(step_id: &str, key: &str) -> StepDefinition {
        StepDefinition::new(
            step_id,
            StepKind::parse(step_id, "click", &json!({"locator_key": key})).unwrap(),
        )
    }

    #[test]
    fn step_configs_override_defaults() {
        let defaults = ExecutionDefaults::default();
        let configs: StepConfigs =
            serde_json::from_value(json!({"retry_attempts": 2, "wait_timeout": 1500, "blocking": false}))
                .unwrap();
        let merged = defaults.merge(&configs);
        assert_eq!(merged.retry_attempts, 2);
        assert_eq!(merged.wait_timeout, Duration::from_millis(1500));
        assert!(!merged.blocking);
        assert_eq!(merged.check_interval, defaults.check_interval);
        assert_eq!(merged.retry_delay, defaults.retry_delay);
    }

    #[test]
    fn step_kind_routes_by_name() {
        let action = StepKind::parse("s1", "press_back", &Value::Null).unwrap();
        assert!(matches!(action, StepKind::Action(_)));
        assert_eq!(action.locator_key(), None);

        let assertion =
            StepKind::parse("s2", "element_appears", &json!({"locator_key": "login"})).unwrap();
        assert!(matches!(assertion, StepKind::Assert(_)));
        assert_eq!(assertion.locator_key(), Some("login"));

        let device =
            StepKind::parse("s3", "current_app", &json!({"expected_package": "com.app"})).unwrap();
        assert!(matches!(device, StepKind::Assert(_)));
        assert!(device.referenced_locators().is_empty());

        let err = StepKind::parse("s3", "dance", &Value::Null).unwrap_err();
        assert!(matches!(err, FlowError::UnknownAction { .. }));
    }

    #[test]
    fn validation_checks_locators_and_ids() {
        let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
        assert!(TestCase::new("tc", vec![click("s1", "login")]).validate(&catalog).is_ok());

        let unknown = TestCase::new("tc", vec![click("s1", "signup")]);
        assert!(matches!(unknown.validate(&catalog), Err(FlowError::ValidationFailed(_))));

        let duplicate = TestCase::new("tc", vec![click("s1", "login"), click("s1", "login")]);
        assert!(duplicate.validate(&catalog).is_err());

        assert!(TestCase::new("tc", vec![]).validate(&catalog).is_err());
    }

    #[test]
    fn statuses_serialize_uppercase() {
        assert_eq!(serde_json::to_value(StepStatus::Skipped).unwrap(), json!("SKIPPED"));
        assert_eq!(serde_json::to_value(TestStatus::Aborted).unwrap(), json!("ABORTED"));
    }
}
