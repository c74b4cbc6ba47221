//! Runs the demo suite in-process against the simulated devices.

use std::path::Path;
use std::sync::Arc;

use action_flow::{
    DefaultFailureHandler, DefaultStepExecutor, DevicePlan, MemorySink, StepStatus, SuiteRunner,
    TestStatus,
};
use action_locator::FALLBACK_CANDIDATE;
use mobiflow_cli::devices::{open_session, select_devices};
use mobiflow_cli::{FrameworkConfig, SuiteLoader};

fn demo_config() -> FrameworkConfig {
    let path = Path::new("demos/config/framework.yaml");
    let mut config = FrameworkConfig::from_yaml_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    config.resolve_paths(path.parent().unwrap());
    config.validate().unwrap();
    config
}

#[tokio::test(start_paused = true)]
async fn demo_suite_heals_the_renamed_login_button() {
    let config = demo_config();
    let suite = SuiteLoader::new("demos/test_suite").load_suite(&[]).unwrap();
    assert_eq!(suite.tests.len(), 2);

    let plans = select_devices(&config, &[])
        .unwrap()
        .into_iter()
        .map(|device| {
            DevicePlan::new(
                open_session(device, &config, suite.catalog.clone()).unwrap(),
                suite.tests.clone(),
            )
        })
        .collect::<Vec<_>>();

    let sink = Arc::new(MemorySink::new());
    let executor = DefaultStepExecutor::new(Arc::new(DefaultFailureHandler::new())).with_sink(sink.clone());
    let results = SuiteRunner::new(Arc::new(executor)).run(plans).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == TestStatus::Passed), "{results:#?}");
    assert_eq!(sink.tests().len(), 4);

    for result in results.iter().filter(|r| r.test_id == "TC001") {
        let tap = result.steps().iter().find(|s| s.step_id == "tap_login").unwrap();
        assert_eq!(tap.status, StepStatus::Passed);
        assert_eq!(tap.healing.len(), 1);
        assert_eq!(tap.healing[0].strategy_used, FALLBACK_CANDIDATE);
        assert_eq!(tap.healing[0].candidate_index, 1);
    }

    for result in results.iter().filter(|r| r.test_id == "TC002") {
        let scroll = result.steps().iter().find(|s| s.step_id == "scroll_to_terms").unwrap();
        let gesture = scroll.gesture.as_ref().unwrap();
        assert_eq!(gesture.swipes, 1);
    }
}
