//! Element resolver with fallback chain orchestration

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use device_adapter::{BackendQuery, DeviceAdapter, ElementHandle};
use mobiflow_core_types::{PollSchedule, PollStop, Poller};
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::healer::{HealBudget, HealRequest, Healer};
use crate::strategies::{builtin_strategies, HealingStrategy};
use crate::transformer::SelectorTransformer;
use crate::types::*;
use crate::visibility::VisibilityChecker;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Resolve a locator, healing if needed, within `options.timeout`
    async fn resolve(
        &self,
        spec: &LocatorSpec,
        options: &ResolveOptions,
    ) -> Result<Resolution, LocatorError>;

    /// Device the resolver queries
    fn adapter(&self) -> &Arc<dyn DeviceAdapter>;

    /// Interactability check shared with callers
    fn checker(&self) -> &VisibilityChecker;

    /// Selector registry used for candidates and ad-hoc selectors
    fn transformer(&self) -> &SelectorTransformer;
}

/// Default resolver: declared candidates first, then heuristic healing,
/// repeated at the poll interval until the timeout. Declared candidates are
/// retried on every pass; heuristic healing shares one `fallback_attempts`
/// budget across all passes of a call.
pub struct LocatorResolver {
    adapter: Arc<dyn DeviceAdapter>,
    transformer: SelectorTransformer,
    checker: VisibilityChecker,
    healer: Healer,
}

enum CandidateOutcome {
    Hit(ElementHandle, BackendQuery),
    Miss(Option<String>),
}

impl LocatorResolver {
    /// Create a resolver with the built-in healing strategies
    pub fn new(
        adapter: Arc<dyn DeviceAdapter>,
        transformer: SelectorTransformer,
        healing: &HealingConfig,
    ) -> Result<Self, LocatorError> {
        Self::with_strategies(adapter, transformer, healing, builtin_strategies())
    }

    pub fn with_strategies(
        adapter: Arc<dyn DeviceAdapter>,
        transformer: SelectorTransformer,
        healing: &HealingConfig,
        strategies: Vec<Arc<dyn HealingStrategy>>,
    ) -> Result<Self, LocatorError> {
        Ok(Self {
            adapter,
            transformer,
            checker: VisibilityChecker::new(),
            healer: Healer::new(healing, strategies)?,
        })
    }

    pub fn with_checker(mut self, checker: VisibilityChecker) -> Self {
        self.checker = checker;
        self
    }

    async fn try_candidate(&self, candidate: &Candidate) -> Result<CandidateOutcome, LocatorError> {
        let backend = self.adapter.backend();
        let query = match self
            .transformer
            .transform(&candidate.selector_type, &candidate.value, backend)
        {
            Ok(query) => query,
            Err(err) => {
                warn!("Candidate {}={} skipped: {}", candidate.selector_type, candidate.value, err);
                return Ok(CandidateOutcome::Miss(Some(err.to_string())));
            }
        };

        let hits = match self.adapter.find_elements(&query).await {
            Ok(hits) => hits,
            Err(err) if err.is_unsupported() || err.retriable => {
                debug!("Query {} missed: {}", query, err);
                return Ok(CandidateOutcome::Miss(Some(err.to_string())));
            }
            Err(err) => return Err(err.into()),
        };

        let mut last_verdict = None;
        for hit in hits {
            let verdict = self.checker.check(self.adapter.as_ref(), &hit).await?;
            if verdict.is_interactable() {
                return Ok(CandidateOutcome::Hit(hit, query));
            }
            last_verdict = Some(format!("{verdict:?}"));
        }
        Ok(CandidateOutcome::Miss(last_verdict))
    }

    /// One pass over the declared candidates, then the healing strategies
    /// while `budget` lasts.
    async fn resolve_pass(
        &self,
        spec: &LocatorSpec,
        options: &ResolveOptions,
        attempted: &mut [AttemptedCandidate],
        budget: &mut HealBudget,
        pass: u32,
    ) -> Result<Option<Resolution>, LocatorError> {
        for (position, (declared_index, candidate)) in spec.ordered().into_iter().enumerate() {
            if options.cancel.is_cancelled() {
                return Err(LocatorError::Cancelled);
            }
            match self.try_candidate(candidate).await? {
                CandidateOutcome::Hit(handle, query) => {
                    let healing = (position > 0).then(|| HealingRecord {
                        locator_key: spec.key.clone(),
                        strategy_used: FALLBACK_CANDIDATE.to_string(),
                        confidence: 1.0,
                        candidate_index: declared_index,
                    });
                    if healing.is_some() {
                        info!(
                            "Resolved '{}' via fallback {}={}",
                            spec.key, candidate.selector_type, candidate.value
                        );
                    } else {
                        debug!("Resolved '{}' via primary candidate", spec.key);
                    }
                    return Ok(Some(Resolution {
                        handle,
                        query: Some(query),
                        healing,
                        attempted: attempted[..=position].to_vec(),
                        passes: pass,
                    }));
                }
                CandidateOutcome::Miss(reason) => attempted[position].miss_reason = reason,
            }
        }

        if !options.healing || !self.healer.has_budget(budget) {
            return Ok(None);
        }
        let request = HealRequest {
            spec,
            adapter: self.adapter.as_ref(),
            transformer: &self.transformer,
            checker: &self.checker,
            expected_text: options.expected_text.as_deref(),
            cancel: &options.cancel,
        };
        Ok(self.healer.heal(&request, budget).await?.map(|(hit, record)| Resolution {
            handle: hit.handle,
            query: hit.query,
            healing: Some(record),
            attempted: attempted.to_vec(),
            passes: pass,
        }))
    }
}

#[async_trait]
impl ElementResolver for LocatorResolver {
    async fn resolve(
        &self,
        spec: &LocatorSpec,
        options: &ResolveOptions,
    ) -> Result<Resolution, LocatorError> {
        debug!("Resolving locator: {}", spec.key);

        let mut attempted: Vec<AttemptedCandidate> = spec
            .ordered()
            .into_iter()
            .map(|(_, c)| c.attempted())
            .collect();

        let schedule = PollSchedule::new(options.poll_interval.max(MIN_POLL_INTERVAL), options.timeout)
            .map_err(|err| LocatorError::InvalidLocator {
                key: spec.key.clone(),
                reason: err.to_string(),
            })?;
        let mut poller = Poller::start(schedule, options.cancel.clone());
        let mut budget = HealBudget::new();

        loop {
            let pass = match poller.next().await {
                Ok(pass) => pass,
                Err(PollStop::Cancelled { .. }) => return Err(LocatorError::Cancelled),
                Err(PollStop::TimedOut { polls, waited }) => {
                    warn!(
                        "Locator '{}' not found after {} pass(es) and {} healing attempt(s) in {}ms",
                        spec.key,
                        polls,
                        budget.spent(),
                        waited.as_millis()
                    );
                    return Err(LocatorError::ElementNotFound {
                        locator_key: spec.key.clone(),
                        attempted,
                    });
                }
            };

            if let Some(resolution) = self
                .resolve_pass(spec, options, &mut attempted, &mut budget, pass)
                .await? {
                return Ok(resolution);
            }
        }
    }

    fn adapter(&self) -> &Arc<dyn DeviceAdapter> {
        &self.adapter
    }

    fn checker(&self) -> &VisibilityChecker {
        &self.checker
    }

    fn transformer(&self) -> &SelectorTransformer {
        &self.transformer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_adapter::sim::{ScreenFixture, SimElement, SimulatedDevice};
    use device_adapter::{Backend, DeviceId, Rect};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn screen() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920))
            .with_element(
                SimElement::new("login", Rect::new(100, 800, 980, 900))
                    .with_resource_id("com.app:id/login_button")
                    .with_class("android.widget.Button")
                    .with_text("Log in"),
            )
            .with_element(
                SimElement::new("tiny", Rect::new(0, 0, 3, 3))
                    .with_resource_id("com.app:id/tiny")
                    .with_text("Tiny"),
            )
    }

    fn resolver(backend: Backend, healing: HealingConfig) -> (Arc<SimulatedDevice>, LocatorResolver) {
        let device = Arc::new(SimulatedDevice::new(DeviceId::new("sim-1"), backend, screen()));
        let resolver =
            LocatorResolver::new(device.clone(), SelectorTransformer::new(), &healing).unwrap();
        (device, resolver)
    }

    fn spec(candidates: &[(&str, &str)]) -> LocatorSpec {
        LocatorSpec::from_declared(
            "login_button",
            candidates
                .iter()
                .map(|(t, v)| (t.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn primary_hit_has_no_healing_record() {
        let (_, resolver) = resolver(Backend::Uiautomator2, HealingConfig::default());
        let resolution = resolver
            .resolve(
                &spec(&[("id", "com.app:id/login_button"), ("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        assert_eq!(resolution.handle.key, "login");
        assert!(resolution.healing.is_none());
    }

    #[tokio::test]
    async fn fallback_candidate_emits_one_record() {
        let (_, resolver) = resolver(Backend::Appium, HealingConfig::default());
        let resolution = resolver
            .resolve(
                &spec(&[("id", "com.app:id/sign_in"), ("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        let record = resolution.healing.unwrap();
        assert_eq!(record.strategy_used, FALLBACK_CANDIDATE);
        assert_eq!(record.candidate_index, 1);
        assert_eq!(record.confidence, 1.0);
    }

    #[tokio::test]
    async fn too_small_element_counts_as_not_found() {
        let (_, resolver) = resolver(Backend::Uiautomator2, HealingConfig::disabled());
        let err = resolver
            .resolve(
                &spec(&[("id", "com.app:id/tiny"), ("text", "Tiny")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap_err();
        let LocatorError::ElementNotFound { attempted, .. } = err else {
            panic!("expected ElementNotFound");
        };
        let tried: Vec<_> = attempted
            .iter()
            .map(|a| (a.selector_type.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(tried, vec![("id", "com.app:id/tiny"), ("text", "Tiny")]);
        assert!(attempted[0].miss_reason.as_deref().unwrap().contains("TooSmall"));
    }

    #[tokio::test]
    async fn text_similarity_heals_renamed_label() {
        let (device, resolver) = resolver(Backend::Uiautomator2, HealingConfig::default());
        device.set_text("login", "Log-in");
        let resolution = resolver
            .resolve(
                &spec(&[("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        let record = resolution.healing.unwrap();
        assert_eq!(record.strategy_used, "text_similarity");
        // first heuristic attempt after one declared candidate
        assert_eq!(record.candidate_index, 1);
        assert!(record.confidence >= 0.8 && record.confidence < 1.0);
    }

    #[tokio::test]
    async fn id_fallback_matches_loosely() {
        let mut healing = HealingConfig::default();
        healing.strategies.retain(|s| s.name == "id_fallback");
        let (_, resolver) = resolver(Backend::Appium, healing);
        let resolution = resolver
            .resolve(
                &spec(&[("id", "com.other:id/login_button")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        assert_eq!(resolution.handle.key, "login");
        assert_eq!(resolution.healing.unwrap().strategy_used, "id_fallback");
    }

    #[tokio::test]
    async fn unsupported_selector_is_a_diagnosed_miss() {
        let (_, resolver) = resolver(Backend::Uiautomator2, HealingConfig::disabled());
        let resolution = resolver
            .resolve(
                &spec(&[("ios_predicate", "label == 'Log in'"), ("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        assert!(resolution.attempted[0]
            .miss_reason
            .as_deref()
            .unwrap()
            .contains("Unsupported selector"));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_element_within_timeout() {
        let (device, resolver) = resolver(Backend::Uiautomator2, HealingConfig::disabled());
        device.remove_element("login");

        let late = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            late.insert_element(
                SimElement::new("login", Rect::new(100, 800, 980, 900)).with_text("Log in"),
            );
        });

        let options = ResolveOptions::new(Duration::from_secs(5), CancellationToken::new())
            .with_poll_interval(Duration::from_millis(500));
        let resolution = resolver.resolve(&spec(&[("text", "Log in")]), &options).await.unwrap();
        assert_eq!(resolution.passes, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_bounds_resolution() {
        let (_, resolver) = resolver(Backend::Uiautomator2, HealingConfig::default());
        let options = ResolveOptions::new(Duration::from_secs(2), CancellationToken::new())
            .with_poll_interval(Duration::from_millis(500));
        let started = Instant::now();
        let err = resolver
            .resolve(&spec(&[("text", "Nowhere to be found")]), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::ElementNotFound { .. }));
        assert!(started.elapsed() <= Duration::from_millis(2500));
    }

    /// Counts invocations and never hits.
    struct CountingStrategy(Arc<AtomicU32>);

    #[async_trait]
    impl HealingStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "text_similarity"
        }

        async fn heal(
            &self,
            _ctx: &crate::strategies::HealContext<'_>,
        ) -> Result<Option<crate::strategies::HealHit>, LocatorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn counting_resolver(device: Arc<SimulatedDevice>) -> (Arc<AtomicU32>, LocatorResolver) {
        let mut healing = HealingConfig::default();
        healing.fallback_attempts = 3;
        healing.strategies.retain(|s| s.name == "text_similarity");
        let calls = Arc::new(AtomicU32::new(0));
        let resolver = LocatorResolver::with_strategies(
            device,
            SelectorTransformer::new(),
            &healing,
            vec![Arc::new(CountingStrategy(calls.clone()))],
        )
        .unwrap();
        (calls, resolver)
    }

    #[tokio::test(start_paused = true)]
    async fn healing_budget_spans_every_pass_of_a_call() {
        let device = Arc::new(SimulatedDevice::new(
            DeviceId::new("sim-1"),
            Backend::Uiautomator2,
            ScreenFixture::new(Rect::new(0, 0, 1080, 1920)),
        ));
        let (calls, resolver) = counting_resolver(device);
        let options = ResolveOptions::new(Duration::from_secs(5), CancellationToken::new())
            .with_poll_interval(Duration::from_millis(500));

        let err = resolver
            .resolve(&spec(&[("text", "Log in")]), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::ElementNotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // a new call starts with a fresh budget
        resolver
            .resolve(
                &spec(&[("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn declared_candidates_keep_polling_after_budget_is_spent() {
        let (device, _) = resolver(Backend::Uiautomator2, HealingConfig::disabled());
        device.remove_element("login");
        let (calls, resolver) = counting_resolver(device.clone());

        let late = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2200)).await;
            late.insert_element(
                SimElement::new("login", Rect::new(100, 800, 980, 900)).with_text("Log in"),
            );
        });

        let options = ResolveOptions::new(Duration::from_secs(5), CancellationToken::new())
            .with_poll_interval(Duration::from_millis(500));
        let resolution = resolver.resolve(&spec(&[("text", "Log in")]), &options).await.unwrap();
        assert_eq!(resolution.passes, 6);
        assert!(resolution.healing.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn declared_only_lookup_skips_healing() {
        let (device, resolver) = resolver(Backend::Uiautomator2, HealingConfig::default());
        device.set_text("login", "Log-in");
        let err = resolver
            .resolve(
                &spec(&[("text", "Log in")]),
                &ResolveOptions::single_pass(CancellationToken::new()).declared_only(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::ElementNotFound { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_resolution() {
        let (_, resolver) = resolver(Backend::Uiautomator2, HealingConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver
            .resolve(
                &spec(&[("text", "Log in")]),
                &ResolveOptions::new(Duration::from_secs(5), cancel),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::Cancelled));
    }
}
