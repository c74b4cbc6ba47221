//! Core types for locator system

use std::fmt;
use std::time::Duration;

use device_adapter::{BackendQuery, ElementHandle};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::LocatorError;

/// Strategy name recorded when a declared non-primary candidate wins.
pub const FALLBACK_CANDIDATE: &str = "fallback_candidate";

/// Open-ended selector type name (`id`, `xpath`, `text`, ...), stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SelectorType(String);

impl SelectorType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SelectorType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SelectorType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SelectorType> for String {
    fn from(value: SelectorType) -> Self {
        value.0
    }
}

impl fmt::Display for SelectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete selector within a locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub selector_type: SelectorType,
    pub value: String,
    /// Lower runs first; ties keep declaration order.
    #[serde(default)]
    pub priority: u32,
}

impl Candidate {
    pub fn new(selector_type: impl Into<SelectorType>, value: impl Into<String>, priority: u32) -> Self {
        Self {
            selector_type: selector_type.into(),
            value: value.into(),
            priority,
        }
    }

    pub fn attempted(&self) -> AttemptedCandidate {
        AttemptedCandidate::new(self.selector_type.as_str(), &self.value)
    }
}

/// Diagnostic trace of a candidate that was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptedCandidate {
    pub selector_type: String,
    pub value: String,
    /// Why the last try missed, when it was not a plain "no match".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miss_reason: Option<String>,
}

impl AttemptedCandidate {
    pub fn new(selector_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector_type: selector_type.into(),
            value: value.into(),
            miss_reason: None,
        }
    }
}

/// Named, ordered set of candidates for one logical element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatorSpec {
    pub key: String,
    candidates: Vec<Candidate>,
}

impl LocatorSpec {
    pub fn new(key: impl Into<String>, candidates: Vec<Candidate>) -> Result<Self, LocatorError> {
        let key = key.into();
        if candidates.is_empty() {
            return Err(LocatorError::InvalidLocator {
                key,
                reason: "at least one candidate is required".to_string(),
            });
        }
        if let Some(blank) = candidates.iter().find(|c| c.value.trim().is_empty()) {
            return Err(LocatorError::InvalidLocator {
                key,
                reason: format!("candidate of type '{}' has an empty value", blank.selector_type),
            });
        }
        Ok(Self { key, candidates })
    }

    /// Builds a spec whose priorities follow declaration order.
    pub fn from_declared(
        key: impl Into<String>,
        declared: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, LocatorError> {
        let candidates = declared
            .into_iter()
            .enumerate()
            .map(|(i, (ty, value))| Candidate::new(ty, value, i as u32))
            .collect();
        Self::new(key, candidates)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Candidates by ascending priority, paired with their declaration index.
    pub fn ordered(&self) -> Vec<(usize, &Candidate)> {
        let mut ordered: Vec<_> = self.candidates.iter().enumerate().collect();
        ordered.sort_by_key(|(_, c)| c.priority);
        ordered
    }

    /// The candidate resolution tries first.
    pub fn primary(&self) -> &Candidate {
        // non-empty by construction
        self.ordered()[0].1
    }
}

/// Emitted whenever resolution succeeded on something other than the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub locator_key: String,
    pub strategy_used: String,
    pub confidence: f64,
    /// Declaration index for fallback candidates; `candidates.len() + k` for
    /// the k-th heuristic attempt.
    pub candidate_index: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_fallback_attempts() -> u32 {
    3
}

fn default_strategies() -> Vec<HealingStrategyConfig> {
    ["text_similarity", "xpath_recovery", "id_fallback"]
        .into_iter()
        .map(|name| HealingStrategyConfig {
            name: name.to_string(),
            enabled: true,
            threshold: None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealingStrategyConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Global self-healing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Upper bound on heuristic strategy invocations per resolution call.
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,
    #[serde(default = "default_strategies")]
    pub strategies: Vec<HealingStrategyConfig>,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_attempts: default_fallback_attempts(),
            strategies: default_strategies(),
        }
    }
}

impl HealingConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LocatorError> {
        for strategy in &self.strategies {
            if let Some(threshold) = strategy.threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(LocatorError::InvalidHealingConfig(format!(
                        "threshold {threshold} for '{}' is outside [0, 1]",
                        strategy.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn enabled_strategies(&self) -> impl Iterator<Item = &HealingStrategyConfig> {
        self.strategies.iter().filter(|s| s.enabled)
    }
}

/// Per-call resolution parameters.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Total budget; zero means one pass.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Overrides the label the text-similarity strategy looks for.
    pub expected_text: Option<String>,
    /// Heuristic healing after the declared candidates miss.
    pub healing: bool,
    pub cancel: CancellationToken,
}

impl ResolveOptions {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(500),
            expected_text: None,
            healing: true,
            cancel,
        }
    }

    /// A single pass with no waiting.
    pub fn single_pass(cancel: CancellationToken) -> Self {
        Self::new(Duration::ZERO, cancel)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_expected_text(mut self, text: impl Into<String>) -> Self {
        self.expected_text = Some(text.into());
        self
    }

    /// Only the declared candidates; no heuristic healing.
    pub fn declared_only(mut self) -> Self {
        self.healing = false;
        self
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub handle: ElementHandle,
    /// Query that produced the element; `None` for label-scan healing.
    pub query: Option<BackendQuery>,
    pub healing: Option<HealingRecord>,
    pub attempted: Vec<AttemptedCandidate>,
    pub passes: u32,
}

impl Resolution {
    pub fn was_healed(&self) -> bool {
        self.healing.is_some()
    }
}
