use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use action_flow::{
    DefaultFailureHandler, DefaultStepExecutor, DevicePlan, StepStatus, SuiteRunner, TestResult,
    TestStatus,
};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::devices::{open_session, select_devices};
use crate::report::{JsonResultsSink, StepLogHook};
use crate::suite::SuiteLoader;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Suite directory holding test_cases/, steps/ and locators/
    #[arg(short, long, default_value = "test_suite")]
    pub suite: PathBuf,

    /// Test case id to run (repeatable); omit or pass `all` for every test
    #[arg(short = 't', long = "test-case")]
    pub test_cases: Vec<String>,

    /// Only run on these device udids (repeatable)
    #[arg(long = "device")]
    pub devices: Vec<String>,

    /// Run all devices concurrently regardless of core.parallel_execution
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Run on the first selected device only
    #[arg(long)]
    pub sequential: bool,

    /// Do not append to results.json
    #[arg(long)]
    pub no_results: bool,
}

#[derive(Debug, Serialize)]
struct TestLine {
    test_id: String,
    device_id: String,
    status: TestStatus,
    duration_ms: u64,
    healed_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    total: usize,
    passed: usize,
    failed: usize,
    aborted: usize,
    duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    results_file: Option<PathBuf>,
    tests: Vec<TestLine>,
}

impl RunSummary {
    fn new(run_id: String, results: &[TestResult], elapsed: Duration, results_file: Option<PathBuf>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            run_id,
            total: results.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            aborted: count(TestStatus::Aborted),
            duration: humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
                .to_string(),
            results_file,
            tests: results
                .iter()
                .map(|r| TestLine {
                    test_id: r.test_id.clone(),
                    device_id: r.device_id.clone(),
                    status: r.status,
                    duration_ms: r.duration_ms,
                    healed_steps: r
                        .steps()
                        .iter()
                        .filter(|s| s.status == StepStatus::Passed && !s.healing.is_empty())
                        .count(),
                    error: r.error.clone(),
                })
                .collect(),
        }
    }

    fn print_human(&self) {
        println!("Run {}", self.run_id);
        for line in &self.tests {
            let healed = if line.healed_steps > 0 {
                format!(" ({} healed)", line.healed_steps)
            } else {
                String::new()
            };
            println!(
                "  {:<8} {:<12} {:<20} {:>7}ms{}",
                line.status.as_str(),
                line.test_id,
                line.device_id,
                line.duration_ms,
                healed
            );
            if let Some(error) = &line.error {
                println!("           {}", error);
            }
        }
        println!(
            "{} passed, {} failed, {} aborted of {} in {}",
            self.passed, self.failed, self.aborted, self.total, self.duration
        );
        if let Some(path) = &self.results_file {
            println!("Results appended to {}", path.display());
        }
    }
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let selection: Vec<String> = args
        .test_cases
        .iter()
        .filter(|id| !id.eq_ignore_ascii_case("all"))
        .cloned()
        .collect();
    let suite = SuiteLoader::new(&args.suite).load_suite(&selection)?;
    if suite.tests.is_empty() {
        bail!("No test cases found under {}", args.suite.display());
    }

    let parallel = if args.parallel {
        true
    } else if args.sequential {
        false
    } else {
        ctx.config().core.parallel_execution
    };
    let mut devices = select_devices(ctx.config(), &args.devices)?;
    if !parallel && devices.len() > 1 {
        info!(
            "Parallel execution disabled, running on the first device only: {}",
            devices[0].udid
        );
        devices.truncate(1);
    }

    let layout = ctx.artifacts(parallel);
    let mut executor = DefaultStepExecutor::new(Arc::new(DefaultFailureHandler::new()))
        .with_hook(Arc::new(StepLogHook::new(layout.clone())));
    let results_file = (!args.no_results).then(|| layout.results_file());
    if let Some(path) = &results_file {
        executor = executor.with_sink(Arc::new(JsonResultsSink::new(path)));
    }

    let plans = devices
        .into_iter()
        .map(|device| {
            open_session(device, ctx.config(), suite.catalog.clone())
                .map(|session| DevicePlan::new(session, suite.tests.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let runner = SuiteRunner::new(Arc::new(executor));
    let cancel = runner.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running tests");
            cancel.cancel();
        }
    });

    info!(
        tests = suite.tests.len(),
        devices = plans.len(),
        parallel,
        "Running suite {}",
        suite.root.display()
    );
    let started = Instant::now();
    let outcome = runner.run(plans).await;
    interrupt.abort();
    let results = outcome?;

    let summary = RunSummary::new(
        runner.run_id().to_string(),
        &results,
        started.elapsed(),
        results_file,
    );
    emit(output, &summary, || summary.print_human())?;

    if summary.passed != summary.total {
        bail!(
            "{} of {} tests did not pass",
            summary.total - summary.passed,
            summary.total
        );
    }
    Ok(())
}
