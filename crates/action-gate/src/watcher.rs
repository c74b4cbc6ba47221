//! Continuous watcher: polls an assertion until it holds or the deadline passes

use std::sync::Arc;

use action_locator::{
    ElementResolver, HealingRecord, LocatorCatalog, LocatorError, LocatorSpec, Resolution,
    ResolveOptions, FALLBACK_CANDIDATE,
};
use async_trait::async_trait;
use chrono::Utc;
use device_adapter::AdapterError;
use mobiflow_core_types::{PollSchedule, PollStop, Poller};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::conditions::{ConditionTracker, Verdict};
use crate::errors::GateError;
use crate::spec::{AssertionSpec, Reads};
use crate::types::{ObservedState, WatchOptions, WatchReport};

/// Assertion watcher trait
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Poll `spec` every `check_interval` until it holds, `wait_timeout`
    /// passes, or `options.cancel` fires.
    async fn watch(
        &self,
        spec: &AssertionSpec,
        options: &WatchOptions,
    ) -> Result<WatchReport, GateError>;
}

/// Default watcher over the locator resolver
pub struct DefaultWatcher {
    resolver: Arc<dyn ElementResolver>,
    catalog: Arc<LocatorCatalog>,
}

struct Observation {
    state: ObservedState,
    healing: Option<HealingRecord>,
}

impl DefaultWatcher {
    pub fn new(resolver: Arc<dyn ElementResolver>, catalog: Arc<LocatorCatalog>) -> Self {
        Self { resolver, catalog }
    }

    /// One fresh, single-pass resolution and a read of what the assertion needs.
    async fn observe(
        &self,
        locator: Option<&LocatorSpec>,
        spec: &AssertionSpec,
        options: &WatchOptions,
        declared_only: bool,
    ) -> Result<Observation, GateError> {
        let Some(locator) = locator else {
            return self.observe_device().await;
        };
        let reads = spec.reads();

        let mut resolve = ResolveOptions::single_pass(options.cancel.clone());
        if let Some(text) = spec.expected_text() {
            resolve = resolve.with_expected_text(text);
        }
        if reads == Reads::AllMatches {
            resolve = resolve.declared_only();
        }

        let resolution = match self.resolver.resolve(locator, &resolve).await {
            Ok(resolution) => resolution,
            Err(LocatorError::ElementNotFound { .. }) => return Ok(Observation::absent(reads)),
            Err(LocatorError::Adapter(err)) if err.retriable => {
                debug!("Poll of '{}' hit a transient device error: {}", locator.key, err);
                return Ok(Observation::absent(reads));
            }
            Err(LocatorError::Cancelled) => return Err(cancelled(spec)),
            Err(err) => return Err(err.into()),
        };

        let healed_heuristically = resolution
            .healing
            .as_ref()
            .is_some_and(|record| record.strategy_used != FALLBACK_CANDIDATE);
        if declared_only && healed_heuristically {
            debug!("Ignoring healed match for '{}' while waiting for absence", locator.key);
            return Ok(Observation::absent(reads));
        }

        match self.read(&resolution, reads).await {
            Ok(state) => Ok(Observation {
                state,
                healing: resolution.healing,
            }),
            // detached between resolve and read
            Err(err) if err.retriable => Ok(Observation::absent(reads)),
            Err(err) => Err(LocatorError::Adapter(err).into()),
        }
    }

    async fn read(
        &self,
        resolution: &Resolution,
        reads: Reads<'_>,
    ) -> Result<ObservedState, AdapterError> {
        let adapter = self.resolver.adapter();
        let handle = &resolution.handle;
        if reads == Reads::AllMatches {
            let matches = match &resolution.query {
                Some(query) => adapter.find_elements(query).await?,
                None => vec![handle.clone()],
            };
            let mut texts = Vec::with_capacity(matches.len());
            for element in &matches {
                if self.resolver.checker().is_interactable(adapter.as_ref(), element).await? {
                    texts.push(adapter.get_text(element).await?);
                }
            }
            return Ok(ObservedState::matches(texts));
        }

        let text = adapter.get_text(handle).await?;
        let bounds = adapter.get_bounds(handle).await?;
        let state = ObservedState::present(text, bounds);
        Ok(match reads {
            Reads::EnabledFlag => state.with_enabled(adapter.is_enabled(handle).await?),
            Reads::SelectedFlag => state.with_selected(adapter.is_selected(handle).await?),
            Reads::Attribute(name) => {
                state.with_attribute(adapter.get_attribute(handle, name).await?)
            }
            _ => state,
        })
    }

    async fn observe_device(&self) -> Result<Observation, GateError> {
        let adapter = self.resolver.adapter();
        let read = async {
            let app = adapter.foreground_package().await?;
            let orientation = adapter.screen_orientation().await?;
            Ok::<_, AdapterError>(ObservedState::device(app, orientation))
        };
        match read.await {
            Ok(state) => Ok(Observation {
                state,
                healing: None,
            }),
            Err(err) if err.retriable => {
                debug!("Device state poll hit a transient error: {}", err);
                Ok(Observation::absent(Reads::Device))
            }
            Err(err) => Err(LocatorError::Adapter(err).into()),
        }
    }
}

impl Observation {
    /// Nothing matched; multi-element reads see zero matches.
    fn absent(reads: Reads<'_>) -> Self {
        let state = match reads {
            Reads::AllMatches => ObservedState::matches(Vec::new()),
            _ => ObservedState::absent(),
        };
        Self {
            state,
            healing: None,
        }
    }
}

fn cancelled(spec: &AssertionSpec) -> GateError {
    GateError::Cancelled(format!("{} on '{}'", spec.name(), spec.subject()))
}

#[async_trait]
impl Watcher for DefaultWatcher {
    async fn watch(
        &self,
        spec: &AssertionSpec,
        options: &WatchOptions,
    ) -> Result<WatchReport, GateError> {
        let started_at = Utc::now();
        spec.validate()?;
        let locator = match spec.locator_key() {
            Some(key) => Some(
                self.catalog
                    .get(key)
                    .map_err(|_| GateError::UnknownLocator(key.to_string()))?,
            ),
            None => None,
        };
        let subject = spec.subject();
        let schedule = PollSchedule::new(options.check_interval, options.wait_timeout)
            .map_err(|err| GateError::InvalidSpec(err.to_string()))?;

        info!(
            assertion = spec.name(),
            locator_key = %subject,
            check_interval_ms = options.check_interval.as_millis() as u64,
            wait_timeout_ms = options.wait_timeout.as_millis() as u64,
            "Starting watch"
        );

        let mut tracker = ConditionTracker::new(spec);
        let declared_only = tracker.wants_absence();
        let mut poller = Poller::start(schedule, options.cancel.clone());
        let mut last_observed = Observation::absent(spec.reads()).state;

        loop {
            let poll = match poller.next().await {
                Ok(poll) => poll,
                Err(PollStop::Cancelled { polls, .. }) => {
                    warn!(assertion = spec.name(), polls, "Watch cancelled");
                    return Err(cancelled(spec));
                }
                Err(PollStop::TimedOut { polls, waited }) => {
                    warn!(
                        assertion = spec.name(),
                        locator_key = %subject,
                        polls,
                        last_observed = %last_observed,
                        "Watch timed out"
                    );
                    return Err(GateError::AssertionTimeout {
                        assertion: spec.name().to_string(),
                        locator_key: subject.to_string(),
                        waited_ms: waited.as_millis() as u64,
                        polls,
                        last_observed,
                    });
                }
            };

            let observation = self.observe(locator, spec, options, declared_only).await?;
            debug!(poll, observed = %observation.state, "Watch poll");

            let verdict = tracker.observe(&observation.state, Instant::now());
            last_observed = observation.state;
            if verdict == Verdict::Satisfied {
                let waited_ms = poller.elapsed().as_millis() as u64;
                info!(
                    assertion = spec.name(),
                    locator_key = %subject,
                    polls = poll,
                    waited_ms,
                    "Assertion satisfied"
                );
                return Ok(WatchReport {
                    assertion: spec.name().to_string(),
                    locator_key: subject.to_string(),
                    started_at,
                    finished_at: Utc::now(),
                    waited_ms,
                    polls: poll,
                    observed: last_observed,
                    healing: observation.healing.into_iter().collect(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::{HealingConfig, LocatorResolver, SelectorTransformer};
    use device_adapter::sim::{ScreenFixture, SimElement, SimulatedDevice};
    use device_adapter::{Backend, DeviceAdapter, DeviceControl, DeviceId, Rect};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    const LOCATORS: &str = r#"
status:
  primary: { type: id, value: "com.app:id/status" }
banner:
  primary: { type: id, value: "com.app:id/banner_v2" }
  fallback_1: { type: text, value: "Sale" }
rows:
  primary: { type: class, value: "android.widget.TextView" }
pay:
  primary: { type: id, value: "com.app:id/pay" }
"#;

    fn screen() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920)).with_element(
            SimElement::new("status", Rect::new(40, 200, 1040, 300))
                .with_resource_id("com.app:id/status")
                .with_text("Loading"),
        )
    }

    fn watcher(fixture: ScreenFixture) -> (DefaultWatcher, Arc<SimulatedDevice>) {
        let device = Arc::new(SimulatedDevice::new(
            DeviceId::new("sim-1"),
            Backend::Appium,
            fixture,
        ));
        let resolver = LocatorResolver::new(
            device.clone(),
            SelectorTransformer::new(),
            &HealingConfig::disabled(),
        )
        .unwrap();
        let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
        (
            DefaultWatcher::new(Arc::new(resolver), Arc::new(catalog)),
            device,
        )
    }

    fn options(interval_ms: u64, timeout_ms: u64) -> WatchOptions {
        WatchOptions::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
            CancellationToken::new(),
        )
    }

    fn assertion(name: &str, params: serde_json::Value) -> AssertionSpec {
        AssertionSpec::parse(name, &params).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn appears_on_first_sighting() {
        let (watcher, device) = watcher(screen());
        device.remove_element("status");
        let late = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1250)).await;
            late.insert_element(
                SimElement::new("status", Rect::new(40, 200, 1040, 300))
                    .with_resource_id("com.app:id/status")
                    .with_text("Ready"),
            );
        });

        let report = watcher
            .watch(&assertion("element_appears", json!({"locator_key": "status"})), &options(500, 5000))
            .await
            .unwrap();
        assert_eq!(report.polls, 4);
        assert_eq!(report.waited_ms, 1500);
        assert_eq!(report.observed.text.as_deref(), Some("Ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn never_blocks_past_timeout_plus_interval() {
        let (watcher, device) = watcher(screen());
        device.remove_element("status");
        let start = Instant::now();

        let err = watcher
            .watch(&assertion("element_appears", json!({"locator_key": "status"})), &options(1000, 3000))
            .await
            .unwrap_err();

        assert!(start.elapsed() <= Duration::from_millis(3000 + 1000));
        match err {
            GateError::AssertionTimeout {
                waited_ms,
                polls,
                last_observed,
                ..
            } => {
                assert_eq!(waited_ms, 3000);
                assert_eq!(polls, 4);
                assert!(!last_observed.present);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_text_never_counts_as_stable() {
        let (watcher, device) = watcher(screen());
        let flapper = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(750)).await;
            for text in ["Done", "Loading", "Done", "Loading", "Done"] {
                flapper.set_text("status", text);
                sleep(Duration::from_millis(1000)).await;
            }
        });

        let err = watcher
            .watch(
                &assertion(
                    "element_appears_and_stable",
                    json!({"locator_key": "status", "stability_duration": 2000}),
                ),
                &options(500, 5000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::AssertionTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stability_window_restarts_after_a_change() {
        let (watcher, device) = watcher(screen());
        let mover = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(750)).await;
            mover.set_bounds("status", Rect::new(40, 260, 1040, 360));
        });

        let report = watcher
            .watch(
                &assertion(
                    "element_appears_and_stable",
                    json!({"locator_key": "status", "stability_duration": 2000}),
                ),
                &options(500, 10_000),
            )
            .await
            .unwrap();
        // change first seen at the 1000ms poll, stable through 3000ms
        assert_eq!(report.waited_ms, 3000);
        assert_eq!(report.observed.bounds, Some(Rect::new(40, 260, 1040, 360)));
    }

    #[tokio::test(start_paused = true)]
    async fn detects_text_change_from_first_sighting() {
        let (watcher, device) = watcher(screen());
        let writer = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1250)).await;
            writer.set_text("status", "Done");
        });

        let report = watcher
            .watch(
                &assertion("element_changes_text", json!({"locator_key": "status"})),
                &options(500, 5000),
            )
            .await
            .unwrap();
        assert_eq!(report.observed.text.as_deref(), Some("Done"));
        assert_eq!(report.waited_ms, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let (watcher, device) = watcher(screen());
        device.remove_element("status");
        let opts = options(1000, 60_000);
        let cancel = opts.cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });
        let start = Instant::now();

        let err = watcher
            .watch(&assertion("element_appears", json!({"locator_key": "status"})), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Cancelled(_)));
        assert!(start.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn disappearance_and_containment() {
        let (watcher, device) = watcher(screen());
        let remover = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(600)).await;
            remover.remove_element("status");
        });
        watcher
            .watch(
                &assertion("element_text_contains", json!({"locator_key": "status", "substring": "Load"})),
                &options(500, 1000),
            )
            .await
            .unwrap();
        let gone = watcher
            .watch(&assertion("element_disappears", json!({"locator_key": "status"})), &options(500, 2000))
            .await
            .unwrap();
        assert!(!gone.observed.present);
        assert_eq!(gone.waited_ms, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_fallback_healing_of_the_satisfying_poll() {
        let fixture = screen().with_element(
            SimElement::new("banner", Rect::new(0, 400, 1080, 600))
                .with_resource_id("com.app:id/banner")
                .with_text("Sale"),
        );
        let (watcher, _device) = watcher(fixture);

        let report = watcher
            .watch(
                &assertion(
                    "element_appears_with_text",
                    json!({"locator_key": "banner", "expected_text": "Sale"}),
                ),
                &options(500, 1000),
            )
            .await
            .unwrap();
        assert_eq!(report.healing.len(), 1);
        assert_eq!(report.healing[0].strategy_used, FALLBACK_CANDIDATE);
        assert_eq!(report.polls, 1);
    }

    fn row(id: &str, top: i32, text: &str) -> SimElement {
        SimElement::new(id, Rect::new(0, top, 1080, top + 100))
            .with_class("android.widget.TextView")
            .with_text(text)
    }

    #[tokio::test(start_paused = true)]
    async fn counts_only_visible_matches() {
        let fixture = screen()
            .with_element(row("r1", 400, "Milk"))
            .with_element(row("r2", 500, "Eggs"))
            .with_element(row("r3", 600, "Bread").hidden());
        let (watcher, device) = watcher(fixture);
        let adder = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(700)).await;
            adder.insert_element(row("r4", 700, "Butter"));
        });

        let report = watcher
            .watch(
                &assertion(
                    "element_count_greater_than",
                    json!({"locator_key": "rows", "min_count": 2}),
                ),
                &options(500, 3000),
            )
            .await
            .unwrap();
        assert_eq!(report.observed.count, Some(3));
        assert_eq!(report.waited_ms, 1000);

        let listed = watcher
            .watch(
                &assertion(
                    "list_contains_text",
                    json!({"locator_key": "rows", "expected_texts": ["Butter", "Milk"]}),
                ),
                &options(500, 1000),
            )
            .await
            .unwrap();
        assert_eq!(listed.observed.texts, vec!["Milk", "Eggs", "Butter"]);

        let err = watcher
            .watch(
                &assertion("element_count", json!({"locator_key": "rows", "expected_count": 4})),
                &options(500, 1000),
            )
            .await
            .unwrap_err();
        match err {
            GateError::AssertionTimeout { last_observed, .. } => {
                assert_eq!(last_observed.count, Some(3))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_rows_count_as_zero() {
        let (watcher, _device) = watcher(screen());
        let report = watcher
            .watch(
                &assertion("element_count", json!({"locator_key": "rows", "expected_count": 0})),
                &options(500, 1000),
            )
            .await
            .unwrap();
        assert_eq!(report.polls, 1);
        assert!(!report.observed.present);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_button_to_become_enabled() {
        let pay = || {
            SimElement::new("pay", Rect::new(40, 1600, 1040, 1760))
                .with_resource_id("com.app:id/pay")
                .with_content_desc("Pay 12 EUR")
                .with_text("Pay")
        };
        let (watcher, device) = watcher(screen().with_element(pay().disabled()));
        let enabler = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1200)).await;
            enabler.insert_element(pay());
        });

        let report = watcher
            .watch(&assertion("element_enabled", json!({"locator_key": "pay"})), &options(500, 5000))
            .await
            .unwrap();
        assert_eq!(report.observed.enabled, Some(true));
        assert_eq!(report.waited_ms, 1500);

        let report = watcher
            .watch(
                &assertion(
                    "attribute_contains",
                    json!({"locator_key": "pay", "attribute_name": "content-desc", "expected_value": "12 EUR"}),
                ),
                &options(500, 1000),
            )
            .await
            .unwrap();
        assert_eq!(report.observed.attribute.as_deref(), Some("Pay 12 EUR"));
    }

    #[tokio::test(start_paused = true)]
    async fn device_state_needs_no_locator() {
        let (watcher, device) = watcher(screen());
        let launcher = device.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(600)).await;
            launcher
                .perform_device_control(DeviceControl::LaunchApp {
                    package: "com.shop".into(),
                    force_stop: false,
                    clear_data: false,
                })
                .await
                .unwrap();
        });

        let report = watcher
            .watch(
                &assertion("current_app", json!({"expected_package": "com.shop"})),
                &options(500, 3000),
            )
            .await
            .unwrap();
        assert_eq!(report.locator_key, "device");
        assert_eq!(report.waited_ms, 1000);

        let err = watcher
            .watch(
                &assertion("screen_orientation", json!({"expected_orientation": "landscape"})),
                &options(500, 1000),
            )
            .await
            .unwrap_err();
        match err {
            GateError::AssertionTimeout { last_observed, .. } => {
                assert_eq!(last_observed.orientation.as_deref(), Some("portrait"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_locator_and_zero_interval_are_rejected() {
        let (watcher, _device) = watcher(screen());
        let err = watcher
            .watch(&assertion("element_appears", json!({"locator_key": "nope"})), &options(500, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::UnknownLocator(key) if key == "nope"));

        let err = watcher
            .watch(&assertion("element_appears", json!({"locator_key": "status"})), &options(0, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidSpec(_)));
    }
}
