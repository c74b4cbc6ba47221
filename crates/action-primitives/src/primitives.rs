//! Action dispatcher implementation
//!
//! Action families:
//! 1. text input - input_text, clear_text
//! 2. gestures - click, long_press, swipe, pull_to_refresh
//! 3. swipe searches - swipe_until_visible (with fallback direction),
//!    swipe_until_not_visible, swipe_and_collect_children
//! 4. navigation - press_back, press_home, open_url
//! 5. device control - launch_app, stop_app, set_orientation, press_key

mod click;
mod device;
mod navigate;
mod scroll;
mod seek;
mod type_text;

pub use click::*;
pub use device::*;
pub use navigate::*;
pub use scroll::*;
pub use seek::*;
pub use type_text::*;

use std::sync::Arc;
use std::time::Duration;

use action_locator::{ElementResolver, LocatorCatalog, LocatorError, LocatorSpec, Resolution};
use async_trait::async_trait;
use device_adapter::{DeviceAdapter, Direction, Gesture, Rect};
use tracing::{debug, warn};

use crate::{
    errors::ActionError,
    geometry,
    spec::ActionSpec,
    types::{ActionReport, DispatchSettings, ExecCtx},
};

/// Action dispatcher trait
///
/// Each dispatch is responsible for:
/// - Re-validating the action parameters before touching the device
/// - Validating execution context
/// - Resolving the elements the action needs
/// - Executing the action through the device adapter
/// - Generating a report
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Execute one action. `resolved` is the already-resolved target of
    /// element actions (see [`ActionSpec::locator_key`]).
    async fn dispatch(
        &self,
        ctx: &ExecCtx,
        action: &ActionSpec,
        resolved: Option<Resolution>,
    ) -> Result<ActionReport, ActionError>;
}

/// Default dispatcher over a resolver and the suite's locator catalog
pub struct DefaultActionDispatcher {
    resolver: Arc<dyn ElementResolver>,
    catalog: Arc<LocatorCatalog>,
    settings: DispatchSettings,
}

impl DefaultActionDispatcher {
    pub fn new(resolver: Arc<dyn ElementResolver>, catalog: Arc<LocatorCatalog>) -> Self {
        Self {
            resolver,
            catalog,
            settings: DispatchSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Arc<dyn ElementResolver> {
        &self.resolver
    }

    /// Get reference to the device adapter
    pub fn adapter(&self) -> &Arc<dyn DeviceAdapter> {
        self.resolver.adapter()
    }

    pub fn locator(&self, key: &str) -> Result<&LocatorSpec, ActionError> {
        Ok(self.catalog.get(key)?)
    }

    /// Fails fast on a cancelled or expired context
    pub fn ensure_active(&self, ctx: &ExecCtx, action: &str) -> Result<(), ActionError> {
        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled("Context cancelled".to_string()));
        }
        if ctx.is_timeout() {
            return Err(ActionError::Timeout(format!(
                "{action}: context deadline exceeded"
            )));
        }
        Ok(())
    }

    /// Resolves `key`, waiting up to the context's lookup budget.
    ///
    /// `expected_text` replaces the label text-similarity healing searches for.
    pub async fn lookup(
        &self,
        ctx: &ExecCtx,
        key: &str,
        expected_text: Option<&str>,
    ) -> Result<Resolution, ActionError> {
        let spec = self.locator(key)?;
        let mut options = ctx.waiting_lookup();
        if let Some(text) = expected_text {
            options = options.with_expected_text(text);
        }
        self.resolve_with(spec, &options).await
    }

    /// One immediate resolution pass; `None` when nothing matched.
    pub async fn probe(
        &self,
        ctx: &ExecCtx,
        spec: &LocatorSpec,
    ) -> Result<Option<Resolution>, ActionError> {
        match self.resolve_with(spec, &ctx.probe_lookup()).await {
            Ok(resolution) => Ok(Some(resolution)),
            Err(ActionError::Locator(LocatorError::ElementNotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn resolve_with(
        &self,
        spec: &LocatorSpec,
        options: &action_locator::ResolveOptions,
    ) -> Result<Resolution, ActionError> {
        self.resolver
            .resolve(spec, options)
            .await
            .map_err(|err| match err {
                LocatorError::Cancelled => {
                    ActionError::Cancelled(format!("lookup of '{}' cancelled", spec.key))
                }
                other => ActionError::Locator(other),
            })
    }

    /// Pre-resolved target if given, otherwise a waiting lookup.
    pub async fn target(
        &self,
        ctx: &ExecCtx,
        key: &str,
        expected_text: Option<&str>,
        resolved: Option<Resolution>,
    ) -> Result<Resolution, ActionError> {
        match resolved {
            Some(resolution) => Ok(resolution),
            None => self.lookup(ctx, key, expected_text).await,
        }
    }

    /// On-screen bounds of the swipe area; whole screen when absent or unresolvable.
    pub async fn swipe_area(
        &self,
        ctx: &ExecCtx,
        key: Option<&str>,
    ) -> Result<Option<Rect>, ActionError> {
        let Some(key) = key else {
            return Ok(None);
        };
        match self.lookup(ctx, key, None).await {
            Ok(area) => {
                let bounds = self.adapter().get_bounds(&area.handle).await?;
                let viewport = self.adapter().viewport().await?;
                Ok(Some(bounds.intersection(&viewport).unwrap_or(bounds)))
            }
            Err(ActionError::Locator(LocatorError::ElementNotFound { .. })) => {
                warn!("Swipe area '{}' not found, swiping on the screen", key);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Builds the swipe gesture for `direction` inside `area` (or the screen).
    pub async fn swipe_gesture(
        &self,
        direction: Direction,
        area: Option<Rect>,
        distance: f64,
    ) -> Result<Gesture, ActionError> {
        let (from, to) = match area {
            Some(bounds) => geometry::area_swipe(bounds, direction, distance),
            None => geometry::screen_swipe(self.adapter().viewport().await?, direction, distance),
        };
        Ok(Gesture::Swipe {
            direction,
            from,
            to,
            duration_ms: self.settings.swipe_duration_ms,
        })
    }

    pub async fn perform(&self, ctx: &ExecCtx, gesture: &Gesture) -> Result<(), ActionError> {
        self.ensure_active(ctx, "gesture")?;
        debug!(action_id = %ctx.action_id, gesture = ?gesture, "Performing gesture");
        self.adapter().perform_gesture(gesture.clone()).await?;
        Ok(())
    }

    /// Sleeps for `pause` unless the context is cancelled first.
    pub async fn settle(&self, ctx: &ExecCtx, pause: Duration) -> Result<(), ActionError> {
        if pause.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = ctx.cancel_token.cancelled() => {
                Err(ActionError::Cancelled("cancelled while waiting for the screen to settle".to_string()))
            }
            _ = tokio::time::sleep(pause) => Ok(()),
        }
    }

    /// Tap point: centre of the on-screen part of the element.
    pub async fn tap_point(&self, resolution: &Resolution) -> Result<(i32, i32), ActionError> {
        let bounds = self.adapter().get_bounds(&resolution.handle).await?;
        let viewport = self.adapter().viewport().await?;
        Ok(bounds.intersection(&viewport).unwrap_or(bounds).center())
    }
}

#[async_trait]
impl ActionDispatcher for DefaultActionDispatcher {
    async fn dispatch(
        &self,
        ctx: &ExecCtx,
        action: &ActionSpec,
        resolved: Option<Resolution>,
    ) -> Result<ActionReport, ActionError> {
        action.validate()?;
        for key in action.referenced_locators() {
            self.locator(key)?;
        }
        self.ensure_active(ctx, action.name())?;

        match action {
            ActionSpec::InputText(p) => execute_input_text(self, ctx, p, resolved).await,
            ActionSpec::ClearText(p) => execute_clear_text(self, ctx, p, resolved).await,
            ActionSpec::Click(p) => execute_click(self, ctx, p, resolved).await,
            ActionSpec::LongPress(p) => execute_long_press(self, ctx, p, resolved).await,
            ActionSpec::Swipe(p) => execute_swipe(self, ctx, p).await,
            ActionSpec::PullToRefresh(p) => execute_pull_to_refresh(self, ctx, p).await,
            ActionSpec::SwipeUntilVisible(p) => execute_swipe_until_visible(self, ctx, p).await,
            ActionSpec::SwipeUntilNotVisible(p) => {
                execute_swipe_until_not_visible(self, ctx, p).await
            }
            ActionSpec::SwipeAndCollectChildren(p) => {
                execute_swipe_and_collect(self, ctx, p).await
            }
            ActionSpec::PressBack | ActionSpec::PressHome | ActionSpec::OpenUrl(_) => {
                execute_navigate(self, ctx, action).await
            }
            ActionSpec::LaunchApp(_)
            | ActionSpec::StopApp(_)
            | ActionSpec::SetOrientation(_)
            | ActionSpec::PressKey(_) => execute_device_control(self, ctx, action).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::{ctx, dispatcher};
    use super::*;
    use device_adapter::sim::{ScreenFixture, SimElement};
    use serde_json::json;

    const LOCATORS: &str = r#"
ok_button:
  primary: { type: id, value: "com.app:id/ok" }
"#;

    fn screen() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920)).with_element(
            SimElement::new("ok", Rect::new(100, 1800, 300, 2000))
                .with_resource_id("com.app:id/ok")
                .with_text("OK"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_locator_is_rejected_before_any_interaction() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse("swipe_until_visible", &json!({"target": "nope"})).unwrap();

        let err = dispatcher.dispatch(&ctx(), &action, None).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::Locator(LocatorError::UnknownLocator(_))
        ));
        assert!(device.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_context_does_nothing() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let ctx = ctx();
        ctx.cancel_token.cancel();

        let err = dispatcher
            .dispatch(&ctx, &ActionSpec::PressBack, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Cancelled(_)));
        assert!(device.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tap_lands_on_visible_part() {
        let (dispatcher, _device) = dispatcher(screen(), LOCATORS);
        let resolution = dispatcher.lookup(&ctx(), "ok_button", None).await.unwrap();
        // element overhangs the bottom edge; only 1800..1920 is on screen
        assert_eq!(dispatcher.tap_point(&resolution).await.unwrap(), (200, 1860));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_is_interrupted_by_cancel() {
        let (dispatcher, _device) = dispatcher(screen(), LOCATORS);
        let ctx = ctx();
        let cancel = ctx.cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = dispatcher
            .settle(&ctx, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
