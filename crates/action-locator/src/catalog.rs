//! Locator files: `key -> {primary, fallback_1, fallback_2, ...}`.

use std::collections::BTreeMap;
use std::path::Path;

use mobiflow_core_types::Backend;
use serde::Deserialize;

use crate::errors::LocatorError;
use crate::transformer::SelectorTransformer;
use crate::types::{Candidate, LocatorSpec};

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(rename = "type")]
    selector_type: String,
    value: String,
}

/// All locators of a suite, validated at load time.
#[derive(Debug, Clone, Default)]
pub struct LocatorCatalog {
    specs: BTreeMap<String, LocatorSpec>,
}

/// `primary` sorts first, then `fallback_N` by N.
fn slot_rank(key: &str, slot: &str) -> Result<u32, LocatorError> {
    if slot == "primary" {
        return Ok(0);
    }
    slot.strip_prefix("fallback_")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| LocatorError::InvalidLocator {
            key: key.to_string(),
            reason: format!("unexpected slot '{slot}', expected primary or fallback_N"),
        })
}

impl LocatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, LocatorError> {
        let parsed: BTreeMap<String, BTreeMap<String, RawCandidate>> = serde_yaml::from_str(raw)
            .map_err(|err| LocatorError::InvalidLocator {
                key: "<file>".to_string(),
                reason: err.to_string(),
            })?;

        let mut catalog = Self::new();
        for (key, slots) in parsed {
            let mut ranked = slots
                .into_iter()
                .map(|(slot, c)| slot_rank(&key, &slot).map(|rank| (rank, c)))
                .collect::<Result<Vec<_>, _>>()?;
            if !ranked.iter().any(|(rank, _)| *rank == 0) {
                return Err(LocatorError::InvalidLocator {
                    key,
                    reason: "missing primary candidate".to_string(),
                });
            }
            ranked.sort_by_key(|(rank, _)| *rank);

            let candidates = ranked
                .into_iter()
                .map(|(rank, c)| Candidate::new(c.selector_type, c.value, rank))
                .collect();
            catalog.insert(LocatorSpec::new(key, candidates)?);
        }
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, LocatorError> {
        let raw = std::fs::read_to_string(path).map_err(|err| LocatorError::InvalidLocator {
            key: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn insert(&mut self, spec: LocatorSpec) {
        self.specs.insert(spec.key.clone(), spec);
    }

    /// Merges `other` in; its entries win on key clashes.
    pub fn extend(&mut self, other: LocatorCatalog) {
        self.specs.extend(other.specs);
    }

    pub fn get(&self, key: &str) -> Result<&LocatorSpec, LocatorError> {
        self.specs
            .get(key)
            .ok_or_else(|| LocatorError::UnknownLocator(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.specs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatorSpec> {
        self.specs.values()
    }

    /// Locators with no candidate the backend can run at all.
    pub fn unusable_on(&self, backend: Backend, transformer: &SelectorTransformer) -> Vec<String> {
        self.specs
            .values()
            .filter(|spec| {
                !spec
                    .candidates()
                    .iter()
                    .any(|c| transformer.supports(&c.selector_type, backend))
            })
            .map(|spec| spec.key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATORS: &str = r#"
login_button:
  fallback_10: { type: xpath, value: "//*[@text='Sign in']" }
  primary: { type: id, value: "com.app:id/login" }
  fallback_2: { type: accessibility_id, value: "login" }
  fallback_1: { type: text, value: "Log in" }
face_id:
  primary: { type: ios_predicate, value: "label == 'Face ID'" }
"#;

    #[test]
    fn slots_sort_numerically() {
        let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
        let spec = catalog.get("login_button").unwrap();
        let types: Vec<&str> = spec
            .ordered()
            .into_iter()
            .map(|(_, c)| c.selector_type.as_str())
            .collect();
        assert_eq!(types, vec!["id", "text", "accessibility_id", "xpath"]);
    }

    #[test]
    fn missing_primary_is_rejected() {
        let err = LocatorCatalog::from_yaml_str("k:\n  fallback_1: { type: id, value: x }\n")
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidLocator { ref key, .. } if key == "k"));
    }

    #[test]
    fn empty_locator_is_rejected() {
        assert!(LocatorCatalog::from_yaml_str("k: {}\n").is_err());
    }

    #[test]
    fn unknown_key_lookup() {
        let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
        assert!(matches!(
            catalog.get("nope"),
            Err(LocatorError::UnknownLocator(_))
        ));
    }

    #[test]
    fn reports_locators_unusable_on_backend() {
        let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
        let t = SelectorTransformer::new();
        assert_eq!(catalog.unusable_on(Backend::Uiautomator2, &t), vec!["face_id"]);
        assert!(catalog.unusable_on(Backend::Appium, &t).is_empty());
    }
}
