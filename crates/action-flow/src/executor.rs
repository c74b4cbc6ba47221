//! Step executor implementation

use std::sync::Arc;

use action_gate::{WatchOptions, WatchReport};
use action_locator::LocatorError;
use action_primitives::{ActionReport, ExecCtx};
use async_trait::async_trait;
use tokio::time::{sleep, timeout_at, Duration, Instant};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::errors::FlowError;
use crate::hooks::{CaptureHook, ResultSink};
use crate::strategies::{FailureHandler, FailureHandlerResult};
use crate::types::*;

/// Step executor trait
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run every step of `test` in order against the context's device
    async fn execute(&self, test: &TestCase, ctx: &mut ExecutionContext) -> TestResult;
}

/// Default step executor implementation
pub struct DefaultStepExecutor {
    failure_handler: Arc<dyn FailureHandler>,
    sinks: Vec<Arc<dyn ResultSink>>,
    hooks: Vec<Arc<dyn CaptureHook>>,
}

enum StepOutcome {
    Action(ActionReport),
    Assertion(WatchReport),
}

struct StepFailure {
    error: FlowError,
    abort: bool,
}

impl DefaultStepExecutor {
    /// Create a new step executor
    pub fn new(failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self {
            failure_handler,
            sinks: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn CaptureHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run one step, retrying per policy
    async fn run_step(
        &self,
        step: &StepDefinition,
        ctx: &ExecutionContext,
        test_deadline: Instant,
    ) -> (StepResult, Option<StepFailure>) {
        let settings = ctx.defaults.merge(&step.configs);
        let mut result = StepResult::new(step);
        let mut attempt = 0;

        loop {
            attempt += 1;
            result.attempts = attempt;
            debug!(step_id = %step.step_id, attempt, "Executing step {}", step.kind.name());

            let outcome = if Instant::now() >= test_deadline {
                Err(self.test_timeout(ctx))
            } else {
                match timeout_at(test_deadline, self.execute_step_once(step, &settings, ctx, test_deadline)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(self.test_timeout(ctx)),
                }
            };

            let error = match outcome {
                Ok(outcome) => {
                    apply_outcome(&mut result, outcome);
                    let result = result.finish();
                    info!(
                        step_id = %step.step_id,
                        attempts = attempt,
                        duration_ms = result.duration_ms,
                        healed = !result.healing.is_empty(),
                        "Step passed"
                    );
                    return (result, None);
                }
                Err(error) => error,
            };

            warn!(step_id = %step.step_id, attempt, "Step attempt failed: {}", error);
            match self
                .failure_handler
                .handle_failure(&step.step_id, &settings, &error, attempt)
            {
                FailureHandlerResult::Retry { backoff_ms, .. } => {
                    if let Err(stop) = self.backoff(ctx, Duration::from_millis(backoff_ms), test_deadline).await {
                        let result = result.with_error(&stop).finish();
                        return (result, Some(StepFailure { error: stop, abort: true }));
                    }
                }
                FailureHandlerResult::Continue(_) => {
                    let result = result.with_error(&error).finish();
                    return (result, Some(StepFailure { error, abort: false }));
                }
                FailureHandlerResult::Abort(_) => {
                    let result = result.with_error(&error).finish();
                    return (result, Some(StepFailure { error, abort: true }));
                }
            }
        }
    }

    /// Execute a step once (without retry)
    async fn execute_step_once(
        &self,
        step: &StepDefinition,
        settings: &StepSettings,
        ctx: &ExecutionContext,
        test_deadline: Instant,
    ) -> Result<StepOutcome, FlowError> {
        match &step.kind {
            StepKind::Action(action) => {
                let exec = ExecCtx::new(ctx.device_id.clone(), test_deadline, ctx.cancel.clone())
                    .with_resolve_timeout(settings.timeout)
                    .with_poll_interval(settings.check_interval);

                let resolved = match action.locator_key() {
                    Some(key) => {
                        let spec = ctx.catalog.get(key)?;
                        let mut options = exec.waiting_lookup();
                        if let Some(text) = action.expected_text() {
                            options = options.with_expected_text(text);
                        }
                        match ctx.resolver.resolve(spec, &options).await {
                            Ok(resolution) => Some(resolution),
                            Err(LocatorError::Cancelled) => {
                                return Err(FlowError::Cancelled(format!("resolving '{key}'")))
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                    None => None,
                };

                let report = ctx.dispatcher.dispatch(&exec, action, resolved).await?;
                Ok(StepOutcome::Action(report))
            }
            StepKind::Assert(assertion) => {
                let options = WatchOptions::new(
                    settings.check_interval,
                    settings.wait_timeout,
                    ctx.cancel.clone(),
                );
                let report = ctx.watcher.watch(assertion, &options).await?;
                Ok(StepOutcome::Assertion(report))
            }
        }
    }

    /// Wait between attempts unless cancelled or out of test budget
    async fn backoff(
        &self,
        ctx: &ExecutionContext,
        pause: Duration,
        test_deadline: Instant,
    ) -> Result<(), FlowError> {
        let wake = Instant::now() + pause;
        if wake > test_deadline {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(FlowError::Cancelled("retry backoff".to_string())),
                _ = tokio::time::sleep_until(test_deadline) => Err(self.test_timeout(ctx)),
            }
        } else {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(FlowError::Cancelled("retry backoff".to_string())),
                _ = sleep(pause) => Ok(()),
            }
        }
    }

    fn test_timeout(&self, ctx: &ExecutionContext) -> FlowError {
        FlowError::TestTimeout(ctx.defaults.test_timeout.as_millis() as u64)
    }

    async fn publish_step(
        &self,
        test: &TestCase,
        ctx: &ExecutionContext,
        step: &StepDefinition,
        result: &StepResult,
        failure: Option<&FlowError>,
    ) {
        if result.status != StepStatus::Skipped {
            for hook in &self.hooks {
                match failure {
                    Some(error) => hook.on_step_failure(&ctx.device_id, step, result, error).await,
                    None => hook.on_step_complete(&ctx.device_id, step, result).await,
                }
            }
        }
        for sink in &self.sinks {
            sink.record_step(&test.test_id, &ctx.device_id, result).await;
        }
    }
}

fn apply_outcome(result: &mut StepResult, outcome: StepOutcome) {
    match outcome {
        StepOutcome::Action(report) => {
            result.healing = report.healing;
            result.gesture = report.gesture;
            result.collected = report.collected;
        }
        StepOutcome::Assertion(report) => {
            result.healing = report.healing;
            result.observed = Some(report.observed);
        }
    }
}

#[async_trait]
impl StepExecutor for DefaultStepExecutor {
    async fn execute(&self, test: &TestCase, ctx: &mut ExecutionContext) -> TestResult {
        info!(
            test_id = %test.test_id,
            device = %ctx.device_id,
            backend = %ctx.backend,
            steps = test.steps.len(),
            "Executing test"
        );

        let mut result = TestResult::new(&ctx.run_id, test, &ctx.device_id, ctx.backend);
        result.status = TestStatus::Running;
        let test_deadline = Instant::now() + ctx.defaults.test_timeout;
        let mut abort_reason: Option<String> = None;
        let mut first_failure: Option<String> = None;

        for step in &test.steps {
            if abort_reason.is_some() {
                let skipped = StepResult::skipped(step);
                self.publish_step(test, ctx, step, &skipped, None).await;
                ctx.record(skipped);
                continue;
            }

            let (step_result, failure) = self.run_step(step, ctx, test_deadline).await;
            self.publish_step(test, ctx, step, &step_result, failure.as_ref().map(|f| &f.error))
                .await;
            ctx.record(step_result);

            if let Some(failure) = failure {
                let reason = format!("step {} failed: {}", step.step_id, failure.error);
                if failure.abort {
                    warn!(test_id = %test.test_id, step_id = %step.step_id, "Aborting test");
                    abort_reason = Some(reason);
                } else if first_failure.is_none() {
                    first_failure = Some(reason);
                }
            }
        }

        for step_result in ctx.take_results() {
            result.push_step(step_result);
        }

        match (abort_reason, first_failure) {
            (Some(reason), _) => result.finish(TestStatus::Aborted, Some(reason)),
            (None, Some(reason)) => result.finish(TestStatus::Failed, Some(reason)),
            (None, None) => result.finish(TestStatus::Passed, None),
        }

        info!(
            test_id = %test.test_id,
            device = %ctx.device_id,
            status = ?result.status,
            duration_ms = result.duration_ms,
            passed = result.count(StepStatus::Passed),
            failed = result.count(StepStatus::Failed),
            skipped = result.count(StepStatus::Skipped),
            "Test finished"
        );

        for sink in &self.sinks {
            sink.record_test(&result).await;
        }
        result
    }
}
