use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use mobiflow_core_types::Backend;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::suite::SuiteLoader;
use action_locator::SelectorTransformer;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Suite directory holding test_cases/, steps/ and locators/
    #[arg(short, long, default_value = "test_suite")]
    pub suite: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Suite directory holding test_cases/
    #[arg(short, long, default_value = "test_suite")]
    pub suite: PathBuf,
}

#[derive(Debug, Default, Serialize)]
struct ValidationReport {
    locators: usize,
    tests: usize,
    steps: usize,
    problems: Vec<String>,
    /// Per backend, locators no candidate of which that backend can run.
    unusable_locators: Vec<(String, Vec<String>)>,
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let mut loader = SuiteLoader::new(&args.suite);
    let mut report = ValidationReport::default();

    let catalog = loader.load_locators()?;
    report.locators = catalog.len();

    for id in loader.test_ids()? {
        match loader.load_test(&id) {
            Ok(test) => match test.validate(&catalog) {
                Ok(()) => {
                    report.tests += 1;
                    report.steps += test.steps.len();
                }
                Err(err) => report.problems.push(format!("{id}: {err}")),
            },
            Err(err) => report.problems.push(format!("{id}: {err:#}")),
        }
    }

    let transformer = SelectorTransformer::new();
    let mut backends: Vec<Backend> = Vec::new();
    for device in &ctx.config().devices {
        if !backends.contains(&device.driver) {
            backends.push(device.driver);
        }
    }
    if backends.is_empty() {
        backends = Backend::ALL.to_vec();
    }
    for backend in backends {
        let unusable = catalog.unusable_on(backend, &transformer);
        if !unusable.is_empty() {
            report.unusable_locators.push((backend.to_string(), unusable));
        }
    }

    emit(output, &report, || {
        println!(
            "{} locators, {} valid tests, {} steps",
            report.locators, report.tests, report.steps
        );
        for (backend, keys) in &report.unusable_locators {
            println!("warning: unusable on {}: {}", backend, keys.join(", "));
        }
        for problem in &report.problems {
            println!("error: {}", problem);
        }
    })?;

    if !report.problems.is_empty() {
        bail!("{} test case(s) failed validation", report.problems.len());
    }
    Ok(())
}

pub async fn cmd_list(args: ListArgs, output: OutputFormat) -> Result<()> {
    let ids = SuiteLoader::new(&args.suite).test_ids()?;
    emit(output, &ids, || {
        for id in &ids {
            println!("{id}");
        }
    })
}
