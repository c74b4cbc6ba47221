//! Bounded heuristic healing
//!
//! Enabled strategies run in configured order, cycling, until
//! `fallback_attempts` invocations are spent or one of them hits. The budget
//! is a [`HealBudget`] owned by one resolution call and shared by all of its
//! passes; nothing is remembered between calls.

use std::collections::HashMap;
use std::sync::Arc;

use device_adapter::DeviceAdapter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::LocatorError;
use crate::strategies::{HealContext, HealHit, HealingStrategy};
use crate::transformer::SelectorTransformer;
use crate::types::{HealingConfig, HealingRecord, LocatorSpec};
use crate::visibility::VisibilityChecker;

struct ConfiguredStrategy {
    strategy: Arc<dyn HealingStrategy>,
    threshold: Option<f64>,
}

pub struct Healer {
    enabled: bool,
    fallback_attempts: u32,
    order: Vec<ConfiguredStrategy>,
}

/// Strategy invocations spent so far by one resolution call.
#[derive(Debug, Default)]
pub struct HealBudget {
    spent: u32,
    rounds: HashMap<&'static str, u32>,
}

impl HealBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }
}

/// Inputs of one healing pass.
pub struct HealRequest<'a> {
    pub spec: &'a LocatorSpec,
    pub adapter: &'a dyn DeviceAdapter,
    pub transformer: &'a SelectorTransformer,
    pub checker: &'a VisibilityChecker,
    pub expected_text: Option<&'a str>,
    pub cancel: &'a CancellationToken,
}

impl Healer {
    /// Binds configured strategy names to implementations; unknown names are
    /// a configuration error.
    pub fn new(
        config: &HealingConfig,
        available: Vec<Arc<dyn HealingStrategy>>,
    ) -> Result<Self, LocatorError> {
        config.validate()?;
        let by_name: HashMap<&'static str, Arc<dyn HealingStrategy>> =
            available.into_iter().map(|s| (s.name(), s)).collect();

        let order = config
            .enabled_strategies()
            .map(|entry| {
                by_name
                    .get(entry.name.as_str())
                    .map(|strategy| ConfiguredStrategy {
                        strategy: Arc::clone(strategy),
                        threshold: entry.threshold,
                    })
                    .ok_or_else(|| {
                        LocatorError::InvalidHealingConfig(format!(
                            "unknown healing strategy '{}'",
                            entry.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: config.enabled,
            fallback_attempts: config.fallback_attempts,
            order,
        })
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.fallback_attempts > 0 && !self.order.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.order.iter().map(|c| c.strategy.name()).collect()
    }

    pub fn fallback_attempts(&self) -> u32 {
        self.fallback_attempts
    }

    /// Whether `budget` still allows a strategy invocation.
    pub fn has_budget(&self, budget: &HealBudget) -> bool {
        self.is_active() && budget.spent < self.fallback_attempts
    }

    /// Runs strategies until one hits or `budget` reaches `fallback_attempts`
    /// invocations. Later calls with the same budget continue the cycle.
    pub async fn heal(
        &self,
        request: &HealRequest<'_>,
        budget: &mut HealBudget,
    ) -> Result<Option<(HealHit, HealingRecord)>, LocatorError> {
        while self.has_budget(budget) {
            if request.cancel.is_cancelled() {
                return Err(LocatorError::Cancelled);
            }

            let attempt = budget.spent;
            let configured = &self.order[attempt as usize % self.order.len()];
            let name = configured.strategy.name();
            let round = budget.rounds.entry(name).or_insert(0);
            let ctx = HealContext {
                spec: request.spec,
                adapter: request.adapter,
                transformer: request.transformer,
                checker: request.checker,
                expected_text: request.expected_text,
                threshold: configured.threshold,
                round: *round,
            };
            *round += 1;
            budget.spent += 1;

            debug!(
                "Healing '{}' attempt {}/{} with {}",
                request.spec.key,
                attempt + 1,
                self.fallback_attempts,
                name
            );
            if let Some(hit) = configured.strategy.heal(&ctx).await? {
                info!(
                    "Healed '{}' with {} (confidence: {:.2})",
                    request.spec.key, name, hit.confidence
                );
                let record = HealingRecord {
                    locator_key: request.spec.key.clone(),
                    strategy_used: name.to_string(),
                    confidence: hit.confidence,
                    candidate_index: request.spec.candidates().len() + attempt as usize,
                };
                return Ok(Some((hit, record)));
            }
        }
        Ok(None)
    }
}
