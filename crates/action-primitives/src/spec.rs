//! Typed action specifications
//!
//! Steps name an action and carry a free-form parameter mapping. Both are
//! turned into an [`ActionSpec`] when the suite is loaded, so malformed
//! parameters fail before any device is touched.

use device_adapter::Direction;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ActionError;

fn yes() -> bool {
    true
}

fn default_direction() -> Direction {
    Direction::Up
}

fn default_count() -> u32 {
    1
}

fn default_distance() -> f64 {
    0.7
}

fn default_max_swipe() -> u32 {
    10
}

fn default_long_press_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputTextParams {
    pub locator_key: String,
    pub text: String,
    #[serde(default = "yes")]
    pub clear_first: bool,
    #[serde(default)]
    pub submit: bool,
    /// Label text-similarity healing looks for instead of the locator's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ElementParams {
    pub locator_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LongPressParams {
    pub locator_key: String,
    #[serde(default = "default_long_press_ms")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SwipeParams {
    #[serde(default = "default_direction")]
    #[schemars(with = "String")]
    pub direction: Direction,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Fraction of the swipe area the finger travels.
    #[serde(default = "default_distance")]
    pub distance: f64,
    /// Locator of the element to swipe inside; whole screen when absent.
    #[serde(default, alias = "selector")]
    pub area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SwipeUntilVisibleParams {
    pub target: String,
    #[serde(default = "default_direction")]
    #[schemars(with = "String")]
    pub direction: Direction,
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub fallback_direction: Option<Direction>,
    #[serde(default = "default_max_swipe", alias = "maxswipe")]
    pub max_swipe: u32,
    #[serde(default, alias = "selector")]
    pub area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SwipeUntilNotVisibleParams {
    pub target: String,
    #[serde(default = "default_direction")]
    #[schemars(with = "String")]
    pub direction: Direction,
    #[serde(default = "default_max_swipe", alias = "maxswipe")]
    pub max_swipe: u32,
    #[serde(default, alias = "selector")]
    pub area: Option<String>,
}

/// Ad-hoc selector for children of a collected list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChildSelector {
    #[serde(rename = "type")]
    pub selector_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CollectChildrenParams {
    pub parent: String,
    #[serde(alias = "child_selector")]
    pub child: ChildSelector,
    #[serde(default = "default_direction")]
    #[schemars(with = "String")]
    pub direction: Direction,
    #[serde(default = "default_max_swipe", alias = "maxswipe")]
    pub max_swipe: u32,
    #[serde(default, alias = "selector")]
    pub area: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AreaParams {
    #[serde(default, alias = "selector")]
    pub area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpenUrlParams {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchAppParams {
    pub app_package: String,
    #[serde(default)]
    pub force_stop: bool,
    #[serde(default)]
    pub clear_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppParams {
    pub app_package: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrientationParams {
    pub orientation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeyParams {
    pub key: String,
}

/// Action families, as the dispatcher groups them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    TextInput,
    Gesture,
    Navigation,
    DeviceControl,
}

/// A validated action with its typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "action", content = "parameters", rename_all = "snake_case")]
pub enum ActionSpec {
    InputText(InputTextParams),
    ClearText(ElementParams),
    Click(ElementParams),
    LongPress(LongPressParams),
    Swipe(SwipeParams),
    SwipeUntilVisible(SwipeUntilVisibleParams),
    SwipeUntilNotVisible(SwipeUntilNotVisibleParams),
    SwipeAndCollectChildren(CollectChildrenParams),
    PullToRefresh(AreaParams),
    PressBack,
    PressHome,
    OpenUrl(OpenUrlParams),
    LaunchApp(LaunchAppParams),
    StopApp(AppParams),
    SetOrientation(OrientationParams),
    PressKey(KeyParams),
}

pub const ACTION_NAMES: [&str; 16] = [
    "input_text",
    "clear_text",
    "click",
    "long_press",
    "swipe",
    "swipe_until_visible",
    "swipe_until_not_visible",
    "swipe_and_collect_children",
    "pull_to_refresh",
    "press_back",
    "press_home",
    "open_url",
    "launch_app",
    "stop_app",
    "set_orientation",
    "press_key",
];

const ORIENTATIONS: [&str; 2] = ["portrait", "landscape"];

fn typed<T: DeserializeOwned>(action: &str, params: &Value) -> Result<T, ActionError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(params).map_err(|err| ActionError::parameter(action, err.to_string()))
}

fn require(action: &str, field: &str, value: &str) -> Result<(), ActionError> {
    if value.trim().is_empty() {
        return Err(ActionError::parameter(action, format!("'{field}' must not be empty")));
    }
    Ok(())
}

impl ActionSpec {
    /// Whether `name` is a known action.
    pub fn is_action(name: &str) -> bool {
        ACTION_NAMES.contains(&name)
    }

    /// Builds and validates an action from its step name and parameters.
    pub fn parse(action: &str, params: &Value) -> Result<Self, ActionError> {
        let spec = match action {
            "input_text" => ActionSpec::InputText(typed(action, params)?),
            "clear_text" => ActionSpec::ClearText(typed(action, params)?),
            "click" => ActionSpec::Click(typed(action, params)?),
            "long_press" => ActionSpec::LongPress(typed(action, params)?),
            "swipe" => ActionSpec::Swipe(typed(action, params)?),
            "swipe_until_visible" => ActionSpec::SwipeUntilVisible(typed(action, params)?),
            "swipe_until_not_visible" => ActionSpec::SwipeUntilNotVisible(typed(action, params)?),
            "swipe_and_collect_children" => {
                ActionSpec::SwipeAndCollectChildren(typed(action, params)?)
            }
            "pull_to_refresh" => ActionSpec::PullToRefresh(typed(action, params)?),
            "press_back" => ActionSpec::PressBack,
            "press_home" => ActionSpec::PressHome,
            "open_url" => ActionSpec::OpenUrl(typed(action, params)?),
            "launch_app" => ActionSpec::LaunchApp(typed(action, params)?),
            "stop_app" => ActionSpec::StopApp(typed(action, params)?),
            "set_orientation" => {
                let mut p: OrientationParams = typed(action, params)?;
                p.orientation = p.orientation.trim().to_ascii_lowercase();
                ActionSpec::SetOrientation(p)
            }
            "press_key" => ActionSpec::PressKey(typed(action, params)?),
            other => return Err(ActionError::parameter(other, "unknown action")),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionSpec::InputText(_) => "input_text",
            ActionSpec::ClearText(_) => "clear_text",
            ActionSpec::Click(_) => "click",
            ActionSpec::LongPress(_) => "long_press",
            ActionSpec::Swipe(_) => "swipe",
            ActionSpec::SwipeUntilVisible(_) => "swipe_until_visible",
            ActionSpec::SwipeUntilNotVisible(_) => "swipe_until_not_visible",
            ActionSpec::SwipeAndCollectChildren(_) => "swipe_and_collect_children",
            ActionSpec::PullToRefresh(_) => "pull_to_refresh",
            ActionSpec::PressBack => "press_back",
            ActionSpec::PressHome => "press_home",
            ActionSpec::OpenUrl(_) => "open_url",
            ActionSpec::LaunchApp(_) => "launch_app",
            ActionSpec::StopApp(_) => "stop_app",
            ActionSpec::SetOrientation(_) => "set_orientation",
            ActionSpec::PressKey(_) => "press_key",
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionSpec::InputText(_) | ActionSpec::ClearText(_) => ActionKind::TextInput,
            ActionSpec::PressBack | ActionSpec::PressHome | ActionSpec::OpenUrl(_) => {
                ActionKind::Navigation
            }
            ActionSpec::LaunchApp(_)
            | ActionSpec::StopApp(_)
            | ActionSpec::SetOrientation(_)
            | ActionSpec::PressKey(_) => ActionKind::DeviceControl,
            _ => ActionKind::Gesture,
        }
    }

    /// Element the action operates on directly, resolved before dispatch.
    pub fn locator_key(&self) -> Option<&str> {
        match self {
            ActionSpec::InputText(p) => Some(p.locator_key.as_str()),
            ActionSpec::ClearText(p) | ActionSpec::Click(p) => Some(p.locator_key.as_str()),
            ActionSpec::LongPress(p) => Some(p.locator_key.as_str()),
            _ => None,
        }
    }

    /// Healing label override for the element in [`Self::locator_key`].
    pub fn expected_text(&self) -> Option<&str> {
        match self {
            ActionSpec::InputText(p) => p.expected_text.as_deref(),
            ActionSpec::ClearText(p) | ActionSpec::Click(p) => p.expected_text.as_deref(),
            ActionSpec::LongPress(p) => p.expected_text.as_deref(),
            _ => None,
        }
    }

    /// Every locator key the action refers to.
    pub fn referenced_locators(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.locator_key().into_iter().collect();
        match self {
            ActionSpec::Swipe(p) => keys.extend(p.area.as_deref()),
            ActionSpec::SwipeUntilVisible(p) => {
                keys.push(&p.target);
                keys.extend(p.area.as_deref());
            }
            ActionSpec::SwipeUntilNotVisible(p) => {
                keys.push(&p.target);
                keys.extend(p.area.as_deref());
            }
            ActionSpec::SwipeAndCollectChildren(p) => {
                keys.push(&p.parent);
                keys.extend(p.area.as_deref());
            }
            ActionSpec::PullToRefresh(p) => keys.extend(p.area.as_deref()),
            _ => {}
        }
        keys
    }

    /// Checks value ranges the type system cannot express.
    pub fn validate(&self) -> Result<(), ActionError> {
        let action = self.name();
        if let Some(key) = self.locator_key() {
            require(action, "locator_key", key)?;
        }
        if let Some(text) = self.expected_text() {
            require(action, "expected_text", text)?;
        }
        match self {
            ActionSpec::LongPress(p) if p.duration_ms == 0 => {
                Err(ActionError::parameter(action, "'duration_ms' must be positive"))
            }
            ActionSpec::Swipe(p) => {
                if p.count == 0 {
                    return Err(ActionError::parameter(action, "'count' must be at least 1"));
                }
                if !(p.distance > 0.0 && p.distance <= 1.0) {
                    return Err(ActionError::parameter(
                        action,
                        format!("'distance' must be in (0, 1], got {}", p.distance),
                    ));
                }
                Ok(())
            }
            ActionSpec::SwipeUntilVisible(p) => require(action, "target", &p.target),
            ActionSpec::SwipeUntilNotVisible(p) => require(action, "target", &p.target),
            ActionSpec::SwipeAndCollectChildren(p) => {
                require(action, "parent", &p.parent)?;
                require(action, "child.type", &p.child.selector_type)?;
                require(action, "child.value", &p.child.value)
            }
            ActionSpec::OpenUrl(p) => url::Url::parse(p.url.trim())
                .map(|_| ())
                .map_err(|err| ActionError::parameter(action, format!("invalid url '{}': {err}", p.url))),
            ActionSpec::LaunchApp(p) => require(action, "app_package", &p.app_package),
            ActionSpec::StopApp(p) => require(action, "app_package", &p.app_package),
            ActionSpec::SetOrientation(p) => {
                if ORIENTATIONS.contains(&p.orientation.as_str()) {
                    Ok(())
                } else {
                    Err(ActionError::parameter(
                        action,
                        format!("orientation must be one of {ORIENTATIONS:?}"),
                    ))
                }
            }
            ActionSpec::PressKey(p) => require(action, "key", &p.key),
            _ => Ok(()),
        }
    }
}
