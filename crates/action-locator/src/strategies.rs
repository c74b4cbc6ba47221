//! Heuristic healing strategies
//!
//! Run only after every declared candidate has missed:
//! 1. text_similarity - closest visible label to the expected text
//! 2. xpath_recovery - progressively relaxed primary XPath
//! 3. id_fallback - loose match on the primary resource id

use std::sync::Arc;

use async_trait::async_trait;
use device_adapter::{xpath, BackendQuery, DeviceAdapter, ElementHandle};
use tracing::{debug, warn};

use crate::errors::LocatorError;
use crate::similarity::{NormalizedLevenshtein, TextSimilarity};
use crate::transformer::SelectorTransformer;
use crate::types::{LocatorSpec, SelectorType};
use crate::visibility::VisibilityChecker;

pub const TEXT_SIMILARITY: &str = "text_similarity";
pub const XPATH_RECOVERY: &str = "xpath_recovery";
pub const ID_FALLBACK: &str = "id_fallback";

const DEFAULT_TEXT_THRESHOLD: f64 = 0.8;
const ID_FALLBACK_CONFIDENCE: f64 = 0.7;
const LABEL_ATTRIBUTES: [&str; 4] = ["text", "label", "name", "content-desc"];

/// Everything a strategy may look at during one invocation.
pub struct HealContext<'a> {
    pub spec: &'a LocatorSpec,
    pub adapter: &'a dyn DeviceAdapter,
    pub transformer: &'a SelectorTransformer,
    pub checker: &'a VisibilityChecker,
    pub expected_text: Option<&'a str>,
    pub threshold: Option<f64>,
    /// How many times this strategy already ran in the current resolution.
    pub round: u32,
}

#[derive(Debug, Clone)]
pub struct HealHit {
    pub handle: ElementHandle,
    pub query: Option<BackendQuery>,
    pub confidence: f64,
}

/// Strategy trait for heuristic healing
#[async_trait]
pub trait HealingStrategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &'static str;

    /// One healing try; `Ok(None)` is a miss.
    async fn heal(&self, ctx: &HealContext<'_>) -> Result<Option<HealHit>, LocatorError>;
}

/// Built-in strategies keyed by their configuration name.
pub fn builtin_strategies() -> Vec<Arc<dyn HealingStrategy>> {
    vec![
        Arc::new(TextSimilarityStrategy::default()),
        Arc::new(XPathRecoveryStrategy),
        Arc::new(IdFallbackStrategy),
    ]
}

/// Label the primary candidate is expected to show on screen.
pub fn expected_label(spec: &LocatorSpec) -> Option<String> {
    let primary = spec.primary();
    let value = primary.value.trim();
    let label = match primary.selector_type.as_str() {
        "text" | "text_contains" | "text_starts_with" | "accessibility_id" => {
            Some(value.to_string())
        }
        "xpath" => xpath::parse(value).ok()?.literal(&LABEL_ATTRIBUTES),
        "id" | "resource_id_contains" => Some(
            resource_entry_name(value)
                .replace(['_', '-'], " ")
                .trim()
                .to_string(),
        ),
        _ => None,
    };
    label.filter(|label| !label.is_empty())
}

/// Resource id named by the primary candidate, if any.
pub fn primary_resource_id(spec: &LocatorSpec) -> Option<String> {
    let primary = spec.primary();
    match primary.selector_type.as_str() {
        "id" => Some(primary.value.trim().to_string()),
        "xpath" => xpath::parse(&primary.value).ok()?.literal(&["resource-id"]),
        _ => None,
    }
}

/// `com.app:id/login_btn` -> `login_btn`
fn resource_entry_name(resource_id: &str) -> &str {
    resource_id
        .rsplit_once(":id/")
        .map_or(resource_id, |(_, entry)| entry)
}

async fn first_interactable(
    ctx: &HealContext<'_>,
    query: &BackendQuery,
) -> Result<Option<ElementHandle>, LocatorError> {
    let hits = match ctx.adapter.find_elements(query).await {
        Ok(hits) => hits,
        Err(err) if err.is_unsupported() || err.retriable => {
            debug!("Healing query {} skipped: {}", query, err);
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    for hit in hits {
        if ctx.checker.is_interactable(ctx.adapter, &hit).await? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Scores every visible element's text against the expected label.
pub struct TextSimilarityStrategy {
    metric: Arc<dyn TextSimilarity>,
}

impl Default for TextSimilarityStrategy {
    fn default() -> Self {
        Self::with_metric(Arc::new(NormalizedLevenshtein))
    }
}

impl TextSimilarityStrategy {
    pub fn with_metric(metric: Arc<dyn TextSimilarity>) -> Self {
        Self { metric }
    }
}

#[async_trait]
impl HealingStrategy for TextSimilarityStrategy {
    fn name(&self) -> &'static str {
        TEXT_SIMILARITY
    }

    async fn heal(&self, ctx: &HealContext<'_>) -> Result<Option<HealHit>, LocatorError> {
        let expected = match ctx.expected_text {
            Some(text) => text.to_string(),
            None => match expected_label(ctx.spec) {
                Some(label) => label,
                None => {
                    debug!("No expected label for '{}'", ctx.spec.key);
                    return Ok(None);
                }
            },
        };
        let threshold = ctx.threshold.unwrap_or(DEFAULT_TEXT_THRESHOLD);

        let mut best: Option<(ElementHandle, f64)> = None;
        for element in ctx.adapter.visible_elements().await? {
            let text = match ctx.adapter.get_text(&element).await {
                Ok(text) => text,
                Err(err) => {
                    debug!("Skipping {}: {}", element, err);
                    continue;
                }
            };
            let score = self.metric.score(&expected, &text);
            // strict comparison keeps the earliest element on ties
            if score < threshold || best.as_ref().is_some_and(|(_, s)| score <= *s) {
                continue;
            }
            if ctx.checker.is_interactable(ctx.adapter, &element).await? {
                debug!("Label '{}' scored {:.3} against '{}'", text, score, expected);
                best = Some((element, score));
            }
        }

        Ok(best.map(|(handle, confidence)| HealHit {
            handle,
            query: None,
            confidence,
        }))
    }
}

/// Drops trailing predicates of the primary XPath, one more per round.
pub struct XPathRecoveryStrategy;

impl XPathRecoveryStrategy {
    pub fn confidence(dropped: usize) -> f64 {
        (1.0 - 0.2 * dropped as f64).max(0.2)
    }
}

#[async_trait]
impl HealingStrategy for XPathRecoveryStrategy {
    fn name(&self) -> &'static str {
        XPATH_RECOVERY
    }

    async fn heal(&self, ctx: &HealContext<'_>) -> Result<Option<HealHit>, LocatorError> {
        let primary = ctx.spec.primary();
        if primary.selector_type.as_str() != "xpath" {
            return Ok(None);
        }
        let parsed = match xpath::parse(&primary.value) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Cannot relax xpath for '{}': {}", ctx.spec.key, err);
                return Ok(None);
            }
        };

        let dropped = ctx.round as usize + 1;
        let Some(relaxed) = parsed
            .relaxed(dropped)
            .filter(|x| !(x.node == "*" && x.predicates.is_empty()))
        else {
            debug!("No predicates left to drop for '{}'", ctx.spec.key);
            return Ok(None);
        };

        let query = ctx.transformer.transform(
            &SelectorType::new("xpath"),
            &relaxed.render(),
            ctx.adapter.backend(),
        )?;
        debug!("Relaxed xpath ({} dropped): {}", dropped, query);

        Ok(first_interactable(ctx, &query)
            .await?
            .map(|handle| HealHit {
                handle,
                query: Some(query),
                confidence: Self::confidence(dropped),
            }))
    }
}

/// Loose `resource-id` containment match on the primary id's entry name.
pub struct IdFallbackStrategy;

#[async_trait]
impl HealingStrategy for IdFallbackStrategy {
    fn name(&self) -> &'static str {
        ID_FALLBACK
    }

    async fn heal(&self, ctx: &HealContext<'_>) -> Result<Option<HealHit>, LocatorError> {
        let Some(resource_id) = primary_resource_id(ctx.spec) else {
            return Ok(None);
        };
        let entry = resource_entry_name(&resource_id);
        if entry.is_empty() {
            return Ok(None);
        }

        let loose = SelectorType::new("resource_id_contains");
        let backend = ctx.adapter.backend();
        if !ctx.transformer.supports(&loose, backend) {
            return Ok(None);
        }
        let query = ctx.transformer.transform(&loose, entry, backend)?;

        Ok(first_interactable(ctx, &query)
            .await?
            .map(|handle| HealHit {
                handle,
                query: Some(query),
                confidence: ID_FALLBACK_CONFIDENCE,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candidate;

    fn spec(ty: &str, value: &str) -> LocatorSpec {
        LocatorSpec::new("k", vec![Candidate::new(ty, value, 0)]).unwrap()
    }

    #[test]
    fn expected_label_sources() {
        assert_eq!(expected_label(&spec("text", " Log in ")).as_deref(), Some("Log in"));
        assert_eq!(
            expected_label(&spec("xpath", "//*[@resource-id='x' and @text='Submit']")).as_deref(),
            Some("Submit")
        );
        assert_eq!(
            expected_label(&spec("id", "com.app:id/sign_up-button")).as_deref(),
            Some("sign up button")
        );
        assert_eq!(expected_label(&spec("class", "android.widget.Button")), None);
    }

    #[test]
    fn resource_id_extraction() {
        assert_eq!(
            primary_resource_id(&spec("xpath", "//*[@resource-id='com.app:id/ok']")).as_deref(),
            Some("com.app:id/ok")
        );
        assert_eq!(resource_entry_name("com.app:id/ok"), "ok");
        assert_eq!(resource_entry_name("ok"), "ok");
    }

    #[test]
    fn xpath_confidence_decays_with_floor() {
        assert!((XPathRecoveryStrategy::confidence(1) - 0.8).abs() < 1e-9);
        assert!((XPathRecoveryStrategy::confidence(2) - 0.6).abs() < 1e-9);
        assert!((XPathRecoveryStrategy::confidence(9) - 0.2).abs() < 1e-9);
    }
}
