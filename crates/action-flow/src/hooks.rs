//! Result sinks and capture hooks fired by the executor

use async_trait::async_trait;
use device_adapter::DeviceId;
use parking_lot::Mutex;

use crate::errors::FlowError;
use crate::types::{StepDefinition, StepResult, TestResult};

/// Receives results as they are produced.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_step(&self, test_id: &str, device_id: &DeviceId, step: &StepResult);

    async fn record_test(&self, result: &TestResult);
}

/// Side effects around step completion (screenshots, dumps, custom logs).
#[async_trait]
pub trait CaptureHook: Send + Sync {
    async fn on_step_complete(&self, device_id: &DeviceId, step: &StepDefinition, result: &StepResult);

    async fn on_step_failure(
        &self,
        device_id: &DeviceId,
        step: &StepDefinition,
        result: &StepResult,
        error: &FlowError,
    );
}

/// In-memory sink, mostly for tests and summaries.
#[derive(Default)]
pub struct MemorySink {
    steps: Mutex<Vec<(String, String, StepResult)>>,
    tests: Mutex<Vec<TestResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(test_id, device_id, step)` in recording order.
    pub fn steps(&self) -> Vec<(String, String, StepResult)> {
        self.steps.lock().clone()
    }

    pub fn tests(&self) -> Vec<TestResult> {
        self.tests.lock().clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record_step(&self, test_id: &str, device_id: &DeviceId, step: &StepResult) {
        self.steps
            .lock()
            .push((test_id.to_string(), device_id.to_string(), step.clone()));
    }

    async fn record_test(&self, result: &TestResult) {
        self.tests.lock().push(result.clone());
    }
}
