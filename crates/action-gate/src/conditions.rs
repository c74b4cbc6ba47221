//! Per-watch condition state
//!
//! Every assertion variant is evaluated against a sequence of
//! [`ObservedState`]s, one per poll. Most variants only look at the current
//! observation; the stability and change-detection variants carry state
//! across polls. Count and device-state variants read the fields the watcher
//! fills for them and ignore the rest.

use std::time::Duration;

use device_adapter::Rect;
use tokio::time::Instant;

use crate::spec::AssertionSpec;
use crate::types::ObservedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Satisfied,
    Pending,
}

impl Verdict {
    fn from_bool(held: bool) -> Self {
        if held {
            Verdict::Satisfied
        } else {
            Verdict::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    text: Option<String>,
    bounds: Option<Rect>,
}

/// Text predicate of the plain text assertions.
#[derive(Debug)]
enum TextRule {
    Equals(String),
    Contains(String),
    Excludes(String),
    StartsWith(String),
    EndsWith(String),
}

impl TextRule {
    fn holds(&self, text: &str) -> bool {
        match self {
            TextRule::Equals(expected) => text == expected,
            TextRule::Contains(part) => text.contains(part.as_str()),
            TextRule::Excludes(part) => !text.contains(part.as_str()),
            TextRule::StartsWith(prefix) => text.starts_with(prefix.as_str()),
            TextRule::EndsWith(suffix) => text.ends_with(suffix.as_str()),
        }
    }
}

fn within(actual: i32, expected: i32, tolerance: u32) -> bool {
    actual.abs_diff(expected) <= tolerance
}

#[derive(Debug)]
enum Tracker {
    Appears,
    Text(TextRule),
    Disappears,
    Enabled(bool),
    Selected(bool),
    AttributeEquals(String),
    AttributeContains(String),
    Count(usize),
    CountAbove(usize),
    ListContains(Vec<String>),
    Position {
        x: i32,
        y: i32,
        tolerance: u32,
    },
    Size {
        width: i32,
        height: i32,
        tolerance: u32,
    },
    App(String),
    Orientation(String),
    Stable {
        window: Duration,
        since: Option<(Instant, Snapshot)>,
    },
    ChangesText {
        baseline: Option<String>,
    },
}

/// Folds polls into a verdict for one assertion.
#[derive(Debug)]
pub struct ConditionTracker {
    tracker: Tracker,
}

impl ConditionTracker {
    pub fn new(spec: &AssertionSpec) -> Self {
        let tracker = match spec {
            AssertionSpec::ElementAppears(_) => Tracker::Appears,
            AssertionSpec::ElementAppearsWithText(p) | AssertionSpec::TextEquals(p) => {
                Tracker::Text(TextRule::Equals(p.expected_text.clone()))
            }
            AssertionSpec::ElementTextContains(p) => {
                Tracker::Text(TextRule::Contains(p.substring.clone()))
            }
            AssertionSpec::TextNotContains(p) => {
                Tracker::Text(TextRule::Excludes(p.unwanted_text.clone()))
            }
            AssertionSpec::TextStartsWith(p) => Tracker::Text(TextRule::StartsWith(p.prefix.clone())),
            AssertionSpec::TextEndsWith(p) => Tracker::Text(TextRule::EndsWith(p.suffix.clone())),
            AssertionSpec::ElementDisappears(_) => Tracker::Disappears,
            AssertionSpec::ElementEnabled(_) => Tracker::Enabled(true),
            AssertionSpec::ElementDisabled(_) => Tracker::Enabled(false),
            AssertionSpec::ElementSelected(_) => Tracker::Selected(true),
            AssertionSpec::ElementNotSelected(_) => Tracker::Selected(false),
            AssertionSpec::AttributeEquals(p) => Tracker::AttributeEquals(p.expected_value.clone()),
            AssertionSpec::AttributeContains(p) => {
                Tracker::AttributeContains(p.expected_value.clone())
            }
            AssertionSpec::ElementCount(p) => Tracker::Count(p.expected_count),
            AssertionSpec::ElementCountGreaterThan(p) => Tracker::CountAbove(p.min_count),
            AssertionSpec::ListContainsText(p) => Tracker::ListContains(p.expected_texts.clone()),
            AssertionSpec::ElementPosition(p) => Tracker::Position {
                x: p.expected_x,
                y: p.expected_y,
                tolerance: p.tolerance,
            },
            AssertionSpec::ElementSize(p) => Tracker::Size {
                width: p.expected_width,
                height: p.expected_height,
                tolerance: p.tolerance,
            },
            AssertionSpec::CurrentApp(p) => Tracker::App(p.expected_package.trim().to_string()),
            AssertionSpec::ScreenOrientation(p) => {
                Tracker::Orientation(p.expected_orientation.clone())
            }
            AssertionSpec::ElementAppearsAndStable(p) => Tracker::Stable {
                window: p.window(),
                since: None,
            },
            AssertionSpec::ElementChangesText(p) => Tracker::ChangesText {
                baseline: p.initial_text.clone(),
            },
        };
        Self { tracker }
    }

    /// Whether presence should count only declared candidates.
    pub fn wants_absence(&self) -> bool {
        matches!(self.tracker, Tracker::Disappears)
    }

    pub fn observe(&mut self, state: &ObservedState, now: Instant) -> Verdict {
        match &mut self.tracker {
            Tracker::Appears => Verdict::from_bool(state.present),
            Tracker::Text(rule) => Verdict::from_bool(
                state.present && state.text.as_deref().is_some_and(|text| rule.holds(text)),
            ),
            Tracker::Disappears => Verdict::from_bool(!state.present),
            Tracker::Enabled(expected) => {
                Verdict::from_bool(state.present && state.enabled == Some(*expected))
            }
            Tracker::Selected(expected) => {
                Verdict::from_bool(state.present && state.selected == Some(*expected))
            }
            Tracker::AttributeEquals(expected) => Verdict::from_bool(
                state.present && state.attribute.as_deref() == Some(expected.as_str()),
            ),
            Tracker::AttributeContains(part) => Verdict::from_bool(
                state.present
                    && state
                        .attribute
                        .as_deref()
                        .is_some_and(|value| value.contains(part.as_str())),
            ),
            Tracker::Count(expected) => Verdict::from_bool(state.count == Some(*expected)),
            Tracker::CountAbove(min) => Verdict::from_bool(state.count.is_some_and(|n| n > *min)),
            Tracker::ListContains(expected) => Verdict::from_bool(
                state.present && expected.iter().all(|text| state.texts.contains(text)),
            ),
            Tracker::Position { x, y, tolerance } => Verdict::from_bool(
                state.present
                    && state.bounds.is_some_and(|b| {
                        within(b.left, *x, *tolerance) && within(b.top, *y, *tolerance)
                    }),
            ),
            Tracker::Size {
                width,
                height,
                tolerance,
            } => Verdict::from_bool(
                state.present
                    && state.bounds.is_some_and(|b| {
                        within(b.width(), *width, *tolerance)
                            && within(b.height(), *height, *tolerance)
                    }),
            ),
            Tracker::App(expected) => {
                Verdict::from_bool(state.app.as_deref() == Some(expected.as_str()))
            }
            Tracker::Orientation(expected) => {
                Verdict::from_bool(state.orientation.as_deref() == Some(expected.as_str()))
            }
            Tracker::Stable { window, since } => {
                if !state.present {
                    *since = None;
                    return Verdict::Pending;
                }
                let snapshot = Snapshot {
                    text: state.text.clone(),
                    bounds: state.bounds,
                };
                match since {
                    Some((start, seen)) if *seen == snapshot => {
                        Verdict::from_bool(now.duration_since(*start) >= *window)
                    }
                    _ => {
                        *since = Some((now, snapshot));
                        Verdict::from_bool(window.is_zero())
                    }
                }
            }
            Tracker::ChangesText { baseline } => {
                if !state.present {
                    return Verdict::Pending;
                }
                let text = state.text.clone().unwrap_or_default();
                match baseline {
                    Some(initial) => Verdict::from_bool(*initial != text),
                    None => {
                        *baseline = Some(text);
                        Verdict::Pending
                    }
                }
            }
        }
    }
}
