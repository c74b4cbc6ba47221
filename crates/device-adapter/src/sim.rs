//! In-memory device used by tests and fixture-driven dry runs.
//!
//! A screen is a flat list of elements in traversal order. Elements marked
//! `scrolls` move with the content offset that swipes change, and, like
//! recycled list rows, only exist in the hierarchy while they overlap the
//! viewport. Static elements are always present.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{DeviceAdapter, DeviceControl, ElementProbe, Gesture, TextInputOptions};
use crate::xpath::{self, CompiledXPath};
use crate::{
    AdapterError, AdapterErrorKind, Backend, BackendQuery, DeviceId, Direction, ElementHandle,
    Rect,
};

fn yes() -> bool {
    true
}

fn default_class() -> String {
    "android.view.View".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimElement {
    pub id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub content_desc: Option<String>,
    /// Bounds at scroll offset (0, 0).
    pub bounds: Rect,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub scrolls: bool,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub selected: bool,
}

impl SimElement {
    pub fn new(id: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: id.into(),
            resource_id: None,
            class: default_class(),
            text: String::new(),
            content_desc: None,
            bounds,
            visible: true,
            scrolls: false,
            parent: None,
            enabled: true,
            clickable: false,
            checked: false,
            focused: false,
            selected: false,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_content_desc(mut self, desc: impl Into<String>) -> Self {
        self.content_desc = Some(desc.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn scrolling(mut self) -> Self {
        self.scrolls = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    fn attribute(&self, name: &str) -> Option<String> {
        let flag = |b: bool| Some(b.to_string());
        match name {
            "text" | "label" | "name" | "value" => Some(self.text.clone()),
            "resource-id" | "resourceId" => self.resource_id.clone(),
            "content-desc" | "description" => self.content_desc.clone(),
            "class" | "className" | "type" => Some(self.class.clone()),
            "displayed" | "visible" => flag(self.visible),
            "enabled" => flag(self.enabled),
            "clickable" => flag(self.clickable),
            "checked" => flag(self.checked),
            "focused" => flag(self.focused),
            "selected" => flag(self.selected),
            _ => None,
        }
    }
}

/// YAML description of a simulated screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenFixture {
    pub viewport: Rect,
    #[serde(default = "yes")]
    pub supports_scroll_reset: bool,
    #[serde(default)]
    pub elements: Vec<SimElement>,
}

impl ScreenFixture {
    pub fn new(viewport: Rect) -> Self {
        Self {
            viewport,
            supports_scroll_reset: true,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: SimElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, AdapterError> {
        serde_yaml::from_str(raw).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("invalid screen fixture: {err}"))
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, AdapterError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AdapterError::new(AdapterErrorKind::DeviceIo)
                .retriable(false)
                .with_hint(format!("{}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }
}

/// Everything the simulated device was asked to do, in order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PerformedAction {
    Gesture(Gesture),
    TextInput { element: String, text: String, submit: bool },
    Control(DeviceControl),
    ScrollReset,
}

#[derive(Debug, Default)]
struct SimState {
    elements: Vec<SimElement>,
    scroll: (i32, i32),
    log: Vec<PerformedAction>,
    foreground_app: Option<String>,
    orientation: Option<String>,
    failures_pending: u32,
}

pub struct SimulatedDevice {
    device_id: DeviceId,
    backend: Backend,
    viewport: Rect,
    supports_scroll_reset: bool,
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new(device_id: DeviceId, backend: Backend, fixture: ScreenFixture) -> Self {
        Self {
            device_id,
            backend,
            viewport: fixture.viewport,
            supports_scroll_reset: fixture.supports_scroll_reset,
            state: Mutex::new(SimState {
                elements: fixture.elements,
                ..SimState::default()
            }),
        }
    }

    pub fn scroll_offset(&self) -> (i32, i32) {
        self.state.lock().scroll
    }

    pub fn actions(&self) -> Vec<PerformedAction> {
        self.state.lock().log.clone()
    }

    pub fn swipe_count(&self) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|a| matches!(a, PerformedAction::Gesture(Gesture::Swipe { .. })))
            .count()
    }

    pub fn foreground_app(&self) -> Option<String> {
        self.state.lock().foreground_app.clone()
    }

    pub fn orientation(&self) -> Option<String> {
        self.state.lock().orientation.clone()
    }

    pub fn text_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.text.clone())
    }

    pub fn insert_element(&self, element: SimElement) {
        let mut state = self.state.lock();
        state.elements.retain(|e| e.id != element.id);
        state.elements.push(element);
    }

    pub fn remove_element(&self, id: &str) {
        self.state.lock().elements.retain(|e| e.id != id);
    }

    pub fn set_text(&self, id: &str, text: impl Into<String>) {
        self.update(id, |e| e.text = text.into());
    }

    pub fn set_visible(&self, id: &str, visible: bool) {
        self.update(id, |e| e.visible = visible);
    }

    pub fn set_bounds(&self, id: &str, bounds: Rect) {
        self.update(id, |e| e.bounds = bounds);
    }

    /// Makes the next `count` element queries fail with a retriable I/O error.
    pub fn fail_next_queries(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut SimElement)) {
        if let Some(element) = self.state.lock().elements.iter_mut().find(|e| e.id == id) {
            apply(element);
        }
    }

    fn take_injected_failure(&self, state: &mut SimState) -> Result<(), AdapterError> {
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(AdapterError::new(AdapterErrorKind::DeviceIo)
                .with_hint(format!("injected failure on {}", self.device_id)));
        }
        Ok(())
    }

    fn screen_bounds(state: &SimState, element: &SimElement) -> Rect {
        if element.scrolls {
            element.bounds.offset(-state.scroll.0, -state.scroll.1)
        } else {
            element.bounds
        }
    }

    fn rendered(&self, state: &SimState, element: &SimElement) -> bool {
        !element.scrolls
            || Self::screen_bounds(state, element)
                .intersection(&self.viewport)
                .is_some()
    }

    fn is_descendant(state: &SimState, element: &SimElement, ancestor: &str) -> bool {
        let parents: HashMap<&str, Option<&str>> = state
            .elements
            .iter()
            .map(|e| (e.id.as_str(), e.parent.as_deref()))
            .collect();
        let mut cursor = element.parent.as_deref();
        let mut hops = 0;
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            hops += 1;
            if hops > parents.len() {
                break;
            }
            cursor = parents.get(id).copied().flatten();
        }
        false
    }

    fn lookup<'a>(
        state: &'a SimState,
        handle: &ElementHandle,
    ) -> Result<&'a SimElement, AdapterError> {
        state
            .elements
            .iter()
            .find(|e| e.id == handle.key)
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::StaleElement).with_hint(handle.key.clone()))
    }

    fn query(
        &self,
        query: &BackendQuery,
        scope: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, AdapterError> {
        if query.backend() != self.backend {
            return Err(AdapterError::new(AdapterErrorKind::InvalidQuery)
                .with_hint(format!("{query} sent to a {} session", self.backend)));
        }

        let mut state = self.state.lock();
        self.take_injected_failure(&mut state)?;
        let matcher = Matcher::compile(query)?;

        let mut hits: Vec<ElementHandle> = state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| self.rendered(&state, e))
            .filter(|(_, e)| scope.map_or(true, |p| Self::is_descendant(&state, e, &p.key)))
            .filter(|(_, e)| matcher.matches(e))
            .map(|(i, e)| ElementHandle::new(e.id.clone(), i))
            .collect();

        if let Some(n) = matcher.position() {
            hits = hits.into_iter().nth(n - 1).into_iter().collect();
        }
        debug!(device = %self.device_id, %query, hits = hits.len(), "sim query");
        Ok(hits)
    }
}

enum Matcher {
    XPath(CompiledXPath),
    Attribute { attr: &'static str, op: MatchOp, value: String },
    Pattern { attr: &'static str, pattern: Regex },
}

enum MatchOp {
    Equals,
    Contains,
    StartsWith,
    IdSuffix,
}

impl Matcher {
    fn compile(query: &BackendQuery) -> Result<Self, AdapterError> {
        let unsupported = |what: &str| {
            AdapterError::new(AdapterErrorKind::UnsupportedQuery).with_hint(what.to_string())
        };
        let attr = |attr: &'static str, op: MatchOp, value: &str| Matcher::Attribute {
            attr,
            op,
            value: value.to_string(),
        };

        let matcher = match query {
            BackendQuery::Appium { by, value } => match by.as_str() {
                "xpath" => Self::xpath(value)?,
                "id" => attr("resource-id", MatchOp::IdSuffix, value),
                "class name" => attr("class", MatchOp::Equals, value),
                "accessibility id" => attr("content-desc", MatchOp::Equals, value),
                "-ios predicate string" | "-ios class chain" | "image" => {
                    return Err(unsupported(by));
                }
                other => {
                    return Err(AdapterError::new(AdapterErrorKind::InvalidQuery)
                        .with_hint(format!("unknown appium strategy '{other}'")));
                }
            },
            BackendQuery::Uiautomator2 { kwarg, value } => match kwarg.as_str() {
                "xpath" => Self::xpath(value)?,
                "resourceId" => attr("resource-id", MatchOp::Equals, value),
                "resourceIdMatches" => Matcher::Pattern {
                    attr: "resource-id",
                    pattern: Regex::new(&format!("^(?:{value})$")).map_err(|err| {
                        AdapterError::new(AdapterErrorKind::InvalidQuery).with_hint(err.to_string())
                    })?,
                },
                "text" => attr("text", MatchOp::Equals, value),
                "textContains" => attr("text", MatchOp::Contains, value),
                "textStartsWith" => attr("text", MatchOp::StartsWith, value),
                "className" => attr("class", MatchOp::Equals, value),
                "description" => attr("content-desc", MatchOp::Equals, value),
                "descriptionContains" => attr("content-desc", MatchOp::Contains, value),
                "clickable" => attr("clickable", MatchOp::Equals, value),
                "enabled" => attr("enabled", MatchOp::Equals, value),
                "checked" => attr("checked", MatchOp::Equals, value),
                "focused" => attr("focused", MatchOp::Equals, value),
                "selected" => attr("selected", MatchOp::Equals, value),
                other => return Err(unsupported(other)),
            },
        };
        Ok(matcher)
    }

    fn xpath(expr: &str) -> Result<Self, AdapterError> {
        xpath::parse(expr)
            .and_then(|x| x.compile())
            .map(Matcher::XPath)
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::UnsupportedQuery).with_hint(err.to_string())
            })
    }

    fn matches(&self, element: &SimElement) -> bool {
        match self {
            Matcher::XPath(compiled) => {
                compiled.node_matches(&element.class)
                    && compiled.attrs_match(&|name: &str| element.attribute(name))
            }
            Matcher::Attribute { attr, op, value } => {
                let Some(actual) = element.attribute(attr) else {
                    return false;
                };
                match op {
                    MatchOp::Equals => &actual == value,
                    MatchOp::Contains => actual.contains(value.as_str()),
                    MatchOp::StartsWith => actual.starts_with(value.as_str()),
                    MatchOp::IdSuffix => {
                        &actual == value || actual.ends_with(&format!(":id/{value}"))
                    }
                }
            }
            Matcher::Pattern { attr, pattern } => element
                .attribute(attr)
                .is_some_and(|actual| pattern.is_match(&actual)),
        }
    }

    fn position(&self) -> Option<usize> {
        match self {
            Matcher::XPath(compiled) => compiled.position(),
            _ => None,
        }
    }
}

#[async_trait]
impl ElementProbe for SimulatedDevice {
    async fn exists(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        let state = self.state.lock();
        Ok(state
            .elements
            .iter()
            .any(|e| e.id == element.key && self.rendered(&state, e)))
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        let state = self.state.lock();
        Ok(Self::lookup(&state, element)?.visible)
    }

    async fn bounds(&self, element: &ElementHandle) -> Result<Rect, AdapterError> {
        let state = self.state.lock();
        let found = Self::lookup(&state, element)?;
        Ok(Self::screen_bounds(&state, found))
    }

    async fn viewport(&self) -> Result<Rect, AdapterError> {
        Ok(self.viewport)
    }
}

#[async_trait]
impl DeviceAdapter for SimulatedDevice {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    async fn find_element(
        &self,
        query: &BackendQuery,
    ) -> Result<Option<ElementHandle>, AdapterError> {
        Ok(self.query(query, None)?.into_iter().next())
    }

    async fn find_elements(
        &self,
        query: &BackendQuery,
    ) -> Result<Vec<ElementHandle>, AdapterError> {
        self.query(query, None)
    }

    async fn find_children(
        &self,
        parent: &ElementHandle,
        query: &BackendQuery,
    ) -> Result<Vec<ElementHandle>, AdapterError> {
        self.query(query, Some(parent))
    }

    async fn visible_elements(&self) -> Result<Vec<ElementHandle>, AdapterError> {
        let state = self.state.lock();
        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.visible
                    && Self::screen_bounds(&state, e)
                        .intersection(&self.viewport)
                        .is_some()
            })
            .map(|(i, e)| ElementHandle::new(e.id.clone(), i))
            .collect())
    }

    async fn get_text(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        let state = self.state.lock();
        Ok(Self::lookup(&state, element)?.text.clone())
    }

    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        let state = self.state.lock();
        Ok(Self::lookup(&state, element)?.attribute(name))
    }

    async fn foreground_package(&self) -> Result<Option<String>, AdapterError> {
        Ok(self.state.lock().foreground_app.clone())
    }

    async fn screen_orientation(&self) -> Result<String, AdapterError> {
        if let Some(orientation) = self.state.lock().orientation.clone() {
            return Ok(orientation);
        }
        Ok(if self.viewport.width() > self.viewport.height() {
            "landscape"
        } else {
            "portrait"
        }
        .to_string())
    }

    async fn perform_gesture(&self, gesture: Gesture) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if let Gesture::Swipe {
            direction, from, to, ..
        } = &gesture
        {
            let dx = (to.0 - from.0).abs();
            let dy = (to.1 - from.1).abs();
            match direction {
                Direction::Up => state.scroll.1 += dy,
                Direction::Down => state.scroll.1 -= dy,
                Direction::Left => state.scroll.0 += dx,
                Direction::Right => state.scroll.0 -= dx,
            }
            debug!(device = %self.device_id, %direction, scroll = ?state.scroll, "sim swipe");
        }
        state.log.push(PerformedAction::Gesture(gesture));
        Ok(())
    }

    async fn perform_text_input(
        &self,
        element: &ElementHandle,
        text: &str,
        options: &TextInputOptions,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        let target = state
            .elements
            .iter_mut()
            .find(|e| e.id == element.key)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::StaleElement).with_hint(element.key.clone())
            })?;
        if options.clear_first {
            target.text = text.to_string();
        } else {
            target.text.push_str(text);
        }
        state.log.push(PerformedAction::TextInput {
            element: element.key.clone(),
            text: text.to_string(),
            submit: options.submit,
        });
        Ok(())
    }

    async fn perform_device_control(&self, control: DeviceControl) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        match &control {
            DeviceControl::LaunchApp { package, .. } => {
                state.foreground_app = Some(package.clone());
            }
            DeviceControl::StopApp { package } => {
                if state.foreground_app.as_deref() == Some(package.as_str()) {
                    state.foreground_app = None;
                }
            }
            DeviceControl::Home => state.foreground_app = None,
            DeviceControl::SetOrientation { orientation } => {
                state.orientation = Some(orientation.clone());
            }
            DeviceControl::Back | DeviceControl::OpenUrl { .. } | DeviceControl::PressKey { .. } => {}
        }
        state.log.push(PerformedAction::Control(control));
        Ok(())
    }

    fn supports_scroll_reset(&self) -> bool {
        self.supports_scroll_reset
    }

    async fn reset_scroll(&self) -> Result<(), AdapterError> {
        if !self.supports_scroll_reset {
            return Err(AdapterError::new(AdapterErrorKind::UnsupportedQuery)
                .with_hint("scroll reset"));
        }
        let mut state = self.state.lock();
        state.scroll = (0, 0);
        state.log.push(PerformedAction::ScrollReset);
        Ok(())
    }
}
