//! Generic selector -> backend query translation.
//!
//! Each selector type maps to at most one rule per backend: an Appium
//! `by` strategy or a UIAutomator2 keyword, plus a value transform. The
//! table is owned by one transformer instance; `register` is the only way
//! to change it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use device_adapter::BackendQuery;
use mobiflow_core_types::Backend;
use tracing::debug;

use crate::errors::LocatorError;
use crate::types::SelectorType;

pub type ValueTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Strategy/keyword name plus value transform for one backend.
#[derive(Clone)]
pub struct BackendRule {
    name: String,
    transform: ValueTransform,
}

impl BackendRule {
    pub fn new(
        name: impl Into<String>,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Passes the value through unchanged.
    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name, str::to_string)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, value: &str) -> (String, String) {
        (self.name.clone(), (self.transform)(value))
    }
}

impl fmt::Debug for BackendRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRule").field("name", &self.name).finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SelectorRule {
    pub appium: Option<BackendRule>,
    pub uiautomator2: Option<BackendRule>,
}

impl SelectorRule {
    fn for_backend(&self, backend: Backend) -> Option<&BackendRule> {
        match backend {
            Backend::Appium => self.appium.as_ref(),
            Backend::Uiautomator2 => self.uiautomator2.as_ref(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelectorTransformer {
    rules: BTreeMap<SelectorType, SelectorRule>,
}

impl Default for SelectorTransformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Quotes a value as an XPath string literal.
pub fn xpath_literal(value: &str) -> String {
    if value.contains('\'') && !value.contains('"') {
        format!("\"{value}\"")
    } else {
        format!("'{value}'")
    }
}

fn text_xpath(value: &str) -> String {
    let lit = xpath_literal(value);
    format!("//*[@text={lit} or @label={lit} or @name={lit}]")
}

fn text_function_xpath(function: &str, value: &str) -> String {
    let lit = xpath_literal(value);
    format!(
        "//*[{function}(@text,{lit}) or {function}(@label,{lit}) or {function}(@name,{lit})]"
    )
}

impl SelectorTransformer {
    /// Transformer preloaded with the built-in selector table.
    pub fn new() -> Self {
        let mut t = Self::empty();

        t.register("id", Some(BackendRule::identity("id")), Some(BackendRule::identity("resourceId")));
        t.register("xpath", Some(BackendRule::identity("xpath")), Some(BackendRule::identity("xpath")));
        t.register(
            "text",
            Some(BackendRule::new("xpath", text_xpath)),
            Some(BackendRule::identity("text")),
        );
        t.register(
            "text_contains",
            Some(BackendRule::new("xpath", |v| text_function_xpath("contains", v))),
            Some(BackendRule::identity("textContains")),
        );
        t.register(
            "text_starts_with",
            Some(BackendRule::new("xpath", |v| text_function_xpath("starts-with", v))),
            Some(BackendRule::identity("textStartsWith")),
        );
        t.register(
            "class",
            Some(BackendRule::identity("class name")),
            Some(BackendRule::identity("className")),
        );
        t.register(
            "accessibility_id",
            Some(BackendRule::identity("accessibility id")),
            Some(BackendRule::identity("description")),
        );

        for state in ["clickable", "enabled", "checked", "focused", "selected"] {
            t.register(
                state,
                Some(BackendRule::new("xpath", move |v| {
                    format!("//*[@{state}='{}']", v.trim().to_ascii_lowercase())
                })),
                Some(BackendRule::new(state, |v| v.trim().to_ascii_lowercase())),
            );
        }

        t.register("ios_predicate", Some(BackendRule::identity("-ios predicate string")), None);
        t.register("ios_class_chain", Some(BackendRule::identity("-ios class chain")), None);
        t.register("image", Some(BackendRule::identity("image")), None);

        t.register(
            "resource_id_contains",
            Some(BackendRule::new("xpath", |v| {
                format!("//*[contains(@resource-id,{})]", xpath_literal(v))
            })),
            Some(BackendRule::new("resourceIdMatches", |v| {
                format!(".*{}.*", regex::escape(v))
            })),
        );

        t
    }

    /// Transformer with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Adds or replaces the rule for `selector_type`; the last call wins.
    pub fn register(
        &mut self,
        selector_type: impl Into<SelectorType>,
        appium: Option<BackendRule>,
        uiautomator2: Option<BackendRule>,
    ) {
        let selector_type = selector_type.into();
        debug!(selector_type = %selector_type, "registering selector rule");
        self.rules.insert(
            selector_type,
            SelectorRule {
                appium,
                uiautomator2,
            },
        );
    }

    pub fn transform(
        &self,
        selector_type: &SelectorType,
        value: &str,
        backend: Backend,
    ) -> Result<BackendQuery, LocatorError> {
        let rule = self
            .rules
            .get(selector_type)
            .and_then(|rule| rule.for_backend(backend))
            .ok_or_else(|| LocatorError::UnsupportedSelector {
                selector_type: selector_type.to_string(),
                backend,
            })?;

        let (name, value) = rule.apply(value);
        Ok(match backend {
            Backend::Appium => BackendQuery::Appium { by: name, value },
            Backend::Uiautomator2 => BackendQuery::Uiautomator2 { kwarg: name, value },
        })
    }

    /// Same as [`transform`](Self::transform) with the backend given by name.
    pub fn transform_named(
        &self,
        selector_type: &str,
        value: &str,
        framework: &str,
    ) -> Result<BackendQuery, LocatorError> {
        let backend: Backend = framework
            .parse()
            .map_err(|_| LocatorError::UnsupportedFramework(framework.to_string()))?;
        self.transform(&SelectorType::new(selector_type), value, backend)
    }

    pub fn supports(&self, selector_type: &SelectorType, backend: Backend) -> bool {
        self.rules
            .get(selector_type)
            .is_some_and(|rule| rule.for_backend(backend).is_some())
    }

    /// Registered selector names with their per-backend strategy names.
    pub fn describe(&self) -> Vec<(String, Option<String>, Option<String>)> {
        self.rules
            .iter()
            .map(|(ty, rule)| {
                (
                    ty.to_string(),
                    rule.appium.as_ref().map(|r| r.name().to_string()),
                    rule.uiautomator2.as_ref().map(|r| r.name().to_string()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> SelectorTransformer {
        SelectorTransformer::new()
    }

    #[test]
    fn id_maps_to_resource_id_keyword_on_uiautomator2() {
        let query = t()
            .transform(&"id".into(), "com.app:id/login_btn", Backend::Uiautomator2)
            .unwrap();
        assert_eq!(
            query,
            BackendQuery::uiautomator2("resourceId", "com.app:id/login_btn")
        );
    }

    #[test]
    fn unknown_selector_is_unsupported() {
        let err = t()
            .transform(&"unknown_type".into(), "x", Backend::Appium)
            .unwrap_err();
        assert!(matches!(
            err,
            LocatorError::UnsupportedSelector { ref selector_type, backend: Backend::Appium }
                if selector_type == "unknown_type"
        ));
    }

    #[test]
    fn unknown_framework_is_rejected() {
        let err = t().transform_named("id", "x", "selenium").unwrap_err();
        assert!(matches!(err, LocatorError::UnsupportedFramework(name) if name == "selenium"));
        assert!(t().transform_named("ID", "x", "UIAutomator2").is_ok());
    }

    #[test]
    fn appium_text_becomes_multi_attribute_xpath() {
        let query = t().transform(&"text".into(), "Log in", Backend::Appium).unwrap();
        assert_eq!(
            query,
            BackendQuery::appium(
                "xpath",
                "//*[@text='Log in' or @label='Log in' or @name='Log in']"
            )
        );
    }

    #[test]
    fn state_selectors_lowercase_their_value() {
        let t = t();
        assert_eq!(
            t.transform(&"checked".into(), "True", Backend::Uiautomator2).unwrap(),
            BackendQuery::uiautomator2("checked", "true")
        );
        assert_eq!(
            t.transform(&"enabled".into(), "FALSE", Backend::Appium).unwrap(),
            BackendQuery::appium("xpath", "//*[@enabled='false']")
        );
    }

    #[test]
    fn ios_only_selectors_have_no_uiautomator2_rule() {
        let t = t();
        assert!(t.supports(&"ios_predicate".into(), Backend::Appium));
        assert!(matches!(
            t.transform(&"ios_predicate".into(), "label == 'OK'", Backend::Uiautomator2),
            Err(LocatorError::UnsupportedSelector { .. })
        ));
    }

    #[test]
    fn later_registration_overrides_earlier() {
        let mut t = t();
        t.register(
            "test_tag",
            Some(BackendRule::new("accessibility id", |v| format!("tag-{v}"))),
            None,
        );
        t.register(
            "test_tag",
            Some(BackendRule::new("xpath", |v| format!("//*[@content-desc='{v}']"))),
            Some(BackendRule::identity("description")),
        );
        assert_eq!(
            t.transform(&"test_tag".into(), "ok", Backend::Appium).unwrap(),
            BackendQuery::appium("xpath", "//*[@content-desc='ok']")
        );

        t.register("id", None, Some(BackendRule::new("resourceId", |v| format!("com.app:id/{v}"))));
        assert_eq!(
            t.transform(&"id".into(), "login", Backend::Uiautomator2).unwrap(),
            BackendQuery::uiautomator2("resourceId", "com.app:id/login")
        );
        assert!(!t.supports(&"id".into(), Backend::Appium));
    }

    #[test]
    fn quotes_in_values_switch_literal_style() {
        assert_eq!(xpath_literal("Don't"), "\"Don't\"");
        assert_eq!(xpath_literal("OK"), "'OK'");
    }
}
