//! Typed assertion specifications

use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GateError;

fn default_stability_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ElementAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub expected_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StableAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    /// Milliseconds the element must stay unchanged.
    #[serde(default = "default_stability_ms", alias = "stability_duration_ms")]
    pub stability_duration: u64,
}

impl StableAssertion {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.stability_duration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    /// Baseline to compare against; the first sighting is used when absent.
    #[serde(default)]
    pub initial_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContainsAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub substring: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExcludesAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub unwanted_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrefixAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SuffixAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AttributeAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    /// Backend attribute name, e.g. `content-desc` or `checked`.
    pub attribute_name: String,
    pub expected_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CountAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub expected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MinCountAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    /// Exclusive lower bound.
    pub min_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListTextAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub expected_texts: Vec<String>,
}

fn default_tolerance() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PositionAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    /// Expected left edge.
    pub expected_x: i32,
    /// Expected top edge.
    pub expected_y: i32,
    #[serde(default = "default_tolerance")]
    pub tolerance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SizeAssertion {
    #[serde(alias = "expected")]
    pub locator_key: String,
    pub expected_width: i32,
    pub expected_height: i32,
    #[serde(default = "default_tolerance")]
    pub tolerance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AppAssertion {
    #[serde(alias = "package")]
    pub expected_package: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OrientationAssertion {
    #[serde(alias = "orientation")]
    pub expected_orientation: String,
}

/// A condition the watcher polls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "assertion", content = "parameters", rename_all = "snake_case")]
pub enum AssertionSpec {
    ElementAppears(ElementAssertion),
    ElementAppearsWithText(TextAssertion),
    ElementAppearsAndStable(StableAssertion),
    ElementChangesText(ChangeAssertion),
    ElementDisappears(ElementAssertion),
    ElementTextContains(ContainsAssertion),
    TextEquals(TextAssertion),
    TextNotContains(ExcludesAssertion),
    TextStartsWith(PrefixAssertion),
    TextEndsWith(SuffixAssertion),
    ElementEnabled(ElementAssertion),
    ElementDisabled(ElementAssertion),
    ElementSelected(ElementAssertion),
    ElementNotSelected(ElementAssertion),
    AttributeEquals(AttributeAssertion),
    AttributeContains(AttributeAssertion),
    ElementCount(CountAssertion),
    ElementCountGreaterThan(MinCountAssertion),
    ListContainsText(ListTextAssertion),
    ElementPosition(PositionAssertion),
    ElementSize(SizeAssertion),
    CurrentApp(AppAssertion),
    ScreenOrientation(OrientationAssertion),
}

pub const ASSERTION_NAMES: [&str; 23] = [
    "element_appears",
    "element_appears_with_text",
    "element_appears_and_stable",
    "element_changes_text",
    "element_disappears",
    "element_text_contains",
    "text_equals",
    "text_not_contains",
    "text_starts_with",
    "text_ends_with",
    "element_enabled",
    "element_disabled",
    "element_selected",
    "element_not_selected",
    "attribute_equals",
    "attribute_contains",
    "element_count",
    "element_count_greater_than",
    "list_contains_text",
    "element_position",
    "element_size",
    "current_app",
    "screen_orientation",
];

const ORIENTATIONS: [&str; 2] = ["portrait", "landscape"];

/// What one poll has to read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reads<'a> {
    /// Text and bounds of the resolved element.
    Element,
    EnabledFlag,
    SelectedFlag,
    Attribute(&'a str),
    /// Every visible node the matching query returns.
    AllMatches,
    /// Device state; no locator involved.
    Device,
}

fn typed<T: DeserializeOwned>(name: &str, params: &Value) -> Result<T, GateError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(params).map_err(|err| GateError::InvalidSpec(format!("{name}: {err}")))
}

fn non_empty(name: &str, field: &str, value: &str) -> Result<(), GateError> {
    if value.is_empty() {
        return Err(GateError::InvalidSpec(format!("{name}: '{field}' must not be empty")));
    }
    Ok(())
}

impl AssertionSpec {
    pub fn is_assertion(name: &str) -> bool {
        ASSERTION_NAMES.contains(&name)
    }

    /// Builds and validates an assertion from its step name and parameters.
    pub fn parse(name: &str, params: &Value) -> Result<Self, GateError> {
        let spec = match name {
            "element_appears" => AssertionSpec::ElementAppears(typed(name, params)?),
            "element_appears_with_text" => AssertionSpec::ElementAppearsWithText(typed(name, params)?),
            "element_appears_and_stable" => {
                AssertionSpec::ElementAppearsAndStable(typed(name, params)?)
            }
            "element_changes_text" => AssertionSpec::ElementChangesText(typed(name, params)?),
            "element_disappears" => AssertionSpec::ElementDisappears(typed(name, params)?),
            "element_text_contains" => AssertionSpec::ElementTextContains(typed(name, params)?),
            "text_equals" => AssertionSpec::TextEquals(typed(name, params)?),
            "text_not_contains" => AssertionSpec::TextNotContains(typed(name, params)?),
            "text_starts_with" => AssertionSpec::TextStartsWith(typed(name, params)?),
            "text_ends_with" => AssertionSpec::TextEndsWith(typed(name, params)?),
            "element_enabled" => AssertionSpec::ElementEnabled(typed(name, params)?),
            "element_disabled" => AssertionSpec::ElementDisabled(typed(name, params)?),
            "element_selected" => AssertionSpec::ElementSelected(typed(name, params)?),
            "element_not_selected" => AssertionSpec::ElementNotSelected(typed(name, params)?),
            "attribute_equals" => AssertionSpec::AttributeEquals(typed(name, params)?),
            "attribute_contains" => AssertionSpec::AttributeContains(typed(name, params)?),
            "element_count" => AssertionSpec::ElementCount(typed(name, params)?),
            "element_count_greater_than" => {
                AssertionSpec::ElementCountGreaterThan(typed(name, params)?)
            }
            "list_contains_text" => AssertionSpec::ListContainsText(typed(name, params)?),
            "element_position" => AssertionSpec::ElementPosition(typed(name, params)?),
            "element_size" => AssertionSpec::ElementSize(typed(name, params)?),
            "current_app" => AssertionSpec::CurrentApp(typed(name, params)?),
            "screen_orientation" => {
                let mut p: OrientationAssertion = typed(name, params)?;
                p.expected_orientation = p.expected_orientation.trim().to_ascii_lowercase();
                AssertionSpec::ScreenOrientation(p)
            }
            other => return Err(GateError::InvalidSpec(format!("unknown assertion '{other}'"))),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssertionSpec::ElementAppears(_) => "element_appears",
            AssertionSpec::ElementAppearsWithText(_) => "element_appears_with_text",
            AssertionSpec::ElementAppearsAndStable(_) => "element_appears_and_stable",
            AssertionSpec::ElementChangesText(_) => "element_changes_text",
            AssertionSpec::ElementDisappears(_) => "element_disappears",
            AssertionSpec::ElementTextContains(_) => "element_text_contains",
            AssertionSpec::TextEquals(_) => "text_equals",
            AssertionSpec::TextNotContains(_) => "text_not_contains",
            AssertionSpec::TextStartsWith(_) => "text_starts_with",
            AssertionSpec::TextEndsWith(_) => "text_ends_with",
            AssertionSpec::ElementEnabled(_) => "element_enabled",
            AssertionSpec::ElementDisabled(_) => "element_disabled",
            AssertionSpec::ElementSelected(_) => "element_selected",
            AssertionSpec::ElementNotSelected(_) => "element_not_selected",
            AssertionSpec::AttributeEquals(_) => "attribute_equals",
            AssertionSpec::AttributeContains(_) => "attribute_contains",
            AssertionSpec::ElementCount(_) => "element_count",
            AssertionSpec::ElementCountGreaterThan(_) => "element_count_greater_than",
            AssertionSpec::ListContainsText(_) => "list_contains_text",
            AssertionSpec::ElementPosition(_) => "element_position",
            AssertionSpec::ElementSize(_) => "element_size",
            AssertionSpec::CurrentApp(_) => "current_app",
            AssertionSpec::ScreenOrientation(_) => "screen_orientation",
        }
    }

    /// Locator the assertion watches; `None` for device-state assertions.
    pub fn locator_key(&self) -> Option<&str> {
        let key = match self {
            AssertionSpec::ElementAppears(p)
            | AssertionSpec::ElementDisappears(p)
            | AssertionSpec::ElementEnabled(p)
            | AssertionSpec::ElementDisabled(p)
            | AssertionSpec::ElementSelected(p)
            | AssertionSpec::ElementNotSelected(p) => &p.locator_key,
            AssertionSpec::ElementAppearsWithText(p) | AssertionSpec::TextEquals(p) => &p.locator_key,
            AssertionSpec::ElementAppearsAndStable(p) => &p.locator_key,
            AssertionSpec::ElementChangesText(p) => &p.locator_key,
            AssertionSpec::ElementTextContains(p) => &p.locator_key,
            AssertionSpec::TextNotContains(p) => &p.locator_key,
            AssertionSpec::TextStartsWith(p) => &p.locator_key,
            AssertionSpec::TextEndsWith(p) => &p.locator_key,
            AssertionSpec::AttributeEquals(p) | AssertionSpec::AttributeContains(p) => {
                &p.locator_key
            }
            AssertionSpec::ElementCount(p) => &p.locator_key,
            AssertionSpec::ElementCountGreaterThan(p) => &p.locator_key,
            AssertionSpec::ListContainsText(p) => &p.locator_key,
            AssertionSpec::ElementPosition(p) => &p.locator_key,
            AssertionSpec::ElementSize(p) => &p.locator_key,
            AssertionSpec::CurrentApp(_) | AssertionSpec::ScreenOrientation(_) => return None,
        };
        Some(key)
    }

    /// Locator key, or `device` for device-state assertions; used in logs and reports.
    pub fn subject(&self) -> &str {
        self.locator_key().unwrap_or("device")
    }

    /// Label handed to the text-similarity healer, if the assertion names one.
    pub fn expected_text(&self) -> Option<&str> {
        match self {
            AssertionSpec::ElementAppearsWithText(p) | AssertionSpec::TextEquals(p) => {
                Some(&p.expected_text)
            }
            _ => None,
        }
    }

    pub fn reads(&self) -> Reads<'_> {
        match self {
            AssertionSpec::ElementEnabled(_) | AssertionSpec::ElementDisabled(_) => {
                Reads::EnabledFlag
            }
            AssertionSpec::ElementSelected(_) | AssertionSpec::ElementNotSelected(_) => {
                Reads::SelectedFlag
            }
            AssertionSpec::AttributeEquals(p) | AssertionSpec::AttributeContains(p) => {
                Reads::Attribute(&p.attribute_name)
            }
            AssertionSpec::ElementCount(_)
            | AssertionSpec::ElementCountGreaterThan(_)
            | AssertionSpec::ListContainsText(_) => Reads::AllMatches,
            AssertionSpec::CurrentApp(_) | AssertionSpec::ScreenOrientation(_) => Reads::Device,
            _ => Reads::Element,
        }
    }

    pub fn validate(&self) -> Result<(), GateError> {
        let name = self.name();
        if let Some(key) = self.locator_key() {
            if key.trim().is_empty() {
                return Err(GateError::InvalidSpec(format!(
                    "{name}: 'locator_key' must not be empty"
                )));
            }
        }
        match self {
            AssertionSpec::ElementTextContains(p) => non_empty(name, "substring", &p.substring),
            AssertionSpec::TextNotContains(p) => non_empty(name, "unwanted_text", &p.unwanted_text),
            AssertionSpec::TextStartsWith(p) => non_empty(name, "prefix", &p.prefix),
            AssertionSpec::TextEndsWith(p) => non_empty(name, "suffix", &p.suffix),
            AssertionSpec::AttributeEquals(p) | AssertionSpec::AttributeContains(p) => {
                non_empty(name, "attribute_name", p.attribute_name.trim())
            }
            AssertionSpec::ListContainsText(p) if p.expected_texts.is_empty() => Err(
                GateError::InvalidSpec(format!("{name}: 'expected_texts' must not be empty")),
            ),
            AssertionSpec::ElementSize(p) if p.expected_width < 0 || p.expected_height < 0 => {
                Err(GateError::InvalidSpec(format!("{name}: sizes must not be negative")))
            }
            AssertionSpec::CurrentApp(p) => {
                non_empty(name, "expected_package", p.expected_package.trim())
            }
            AssertionSpec::ScreenOrientation(p) => {
                if ORIENTATIONS.contains(&p.expected_orientation.as_str()) {
                    Ok(())
                } else {
                    Err(GateError::InvalidSpec(format!(
                        "{name}: orientation must be one of {ORIENTATIONS:?}"
                    )))
                }
            }
            _ => Ok(()),
        }
    }
}
