//! Suite runs across devices: one worker per device, tests sequential within it

use std::sync::Arc;

use device_adapter::{Backend, DeviceId};
use mobiflow_core_types::RunId;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::context::DeviceSession;
use crate::errors::FlowError;
use crate::executor::StepExecutor;
use crate::types::{TestCase, TestResult, TestStatus};

/// The tests one device should run, in order.
#[derive(Clone)]
pub struct DevicePlan {
    pub session: DeviceSession,
    pub tests: Vec<Arc<TestCase>>,
}

impl DevicePlan {
    pub fn new(session: DeviceSession, tests: Vec<Arc<TestCase>>) -> Self {
        Self { session, tests }
    }
}

pub struct SuiteRunner {
    executor: Arc<dyn StepExecutor>,
    run_id: RunId,
    cancel: CancellationToken,
    parallel: bool,
}

impl SuiteRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            executor,
            run_id: RunId::new(),
            cancel: CancellationToken::new(),
            parallel: true,
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run devices one after another instead of concurrently.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Results are grouped by device in plan order, tests in declaration order.
    pub async fn run(&self, plans: Vec<DevicePlan>) -> Result<Vec<TestResult>, FlowError> {
        info!(
            run_id = %self.run_id,
            devices = plans.len(),
            parallel = self.parallel,
            "Starting suite"
        );

        let mut merged = Vec::new();
        if !self.parallel {
            for plan in plans {
                merged.extend(
                    run_device(self.executor.clone(), plan, self.run_id.clone(), self.cancel.clone())
                        .await,
                );
            }
            return Ok(merged);
        }

        let mut handles = Vec::with_capacity(plans.len());
        for plan in plans {
            let device_id = plan.session.device_id.clone();
            let backend = plan.session.backend();
            let tests = plan.tests.clone();
            let executor = Arc::clone(&self.executor);
            let run_id = self.run_id.clone();
            let cancel = self.cancel.clone();
            let handle = tokio::spawn(async move { run_device(executor, plan, run_id, cancel).await });
            handles.push((device_id, backend, tests, handle));
        }

        // a failed worker costs its own device's results only
        for (device_id, backend, tests, handle) in handles {
            match handle.await {
                Ok(results) => merged.extend(results),
                Err(err) => {
                    error!(device = %device_id, tests = tests.len(), "device worker failed: {err}");
                    let reason = format!("device worker failed: {err}");
                    merged.extend(tests.iter().map(|test| {
                        aborted(&self.run_id, test, &device_id, backend, reason.clone())
                    }));
                }
            }
        }
        Ok(merged)
    }
}

fn aborted(
    run_id: &RunId,
    test: &TestCase,
    device_id: &DeviceId,
    backend: Backend,
    reason: String,
) -> TestResult {
    let mut result = TestResult::new(run_id, test, device_id, backend);
    result.finish(TestStatus::Aborted, Some(reason));
    result
}

async fn run_device(
    executor: Arc<dyn StepExecutor>,
    plan: DevicePlan,
    run_id: RunId,
    cancel: CancellationToken,
) -> Vec<TestResult> {
    let device_id = plan.session.device_id.clone();
    info!(device = %device_id, tests = plan.tests.len(), "Device worker started");

    let mut results = Vec::with_capacity(plan.tests.len());
    for test in &plan.tests {
        let result = match plan.session.context(run_id.clone(), cancel.child_token()) {
            Ok(mut ctx) => executor.execute(test, &mut ctx).await,
            Err(err) => {
                error!(device = %device_id, test_id = %test.test_id, "cannot prepare test: {err}");
                aborted(&run_id, test, &device_id, plan.session.backend(), err.to_string())
            }
        };
        results.push(result);
    }

    info!(device = %device_id, "Device worker finished");
    results
}
