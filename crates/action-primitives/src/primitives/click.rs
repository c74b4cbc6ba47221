//! Click and long-press primitives

use crate::{
    errors::ActionError,
    primitives::DefaultActionDispatcher,
    spec::{ElementParams, LongPressParams},
    types::{ActionReport, ExecCtx},
};
use action_locator::Resolution;
use chrono::Utc;
use device_adapter::Gesture;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute click primitive
///
/// Steps:
/// 1. Resolve element via locator (with fallback)
/// 2. Tap the centre of its on-screen part
/// 3. Generate action report
pub async fn execute_click(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &ElementParams,
    resolved: Option<Resolution>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        locator_key = %params.locator_key,
        "Executing click primitive"
    );

    let resolution = dispatcher
        .target(ctx, &params.locator_key, params.expected_text.as_deref(), resolved)
        .await?;
    let (x, y) = dispatcher.tap_point(&resolution).await?;
    debug!("Tapping {} at ({}, {})", resolution.handle, x, y);
    dispatcher.perform(ctx, &Gesture::Tap { x, y }).await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Click completed successfully"
    );

    Ok(ActionReport::success("click", started_at, latency_ms).with_healing(resolution.healing))
}

/// Execute long_press primitive
pub async fn execute_long_press(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &LongPressParams,
    resolved: Option<Resolution>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        locator_key = %params.locator_key,
        duration_ms = params.duration_ms,
        "Executing long_press primitive"
    );

    let resolution = dispatcher
        .target(ctx, &params.locator_key, params.expected_text.as_deref(), resolved)
        .await?;
    let (x, y) = dispatcher.tap_point(&resolution).await?;
    dispatcher
        .perform(
            ctx,
            &Gesture::LongPress {
                x,
                y,
                duration_ms: params.duration_ms,
            },
        )
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success("long_press", started_at, latency_ms).with_healing(resolution.healing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testkit::{ctx, dispatcher, healing_dispatcher};
    use crate::primitives::ActionDispatcher;
    use crate::spec::ActionSpec;
    use action_locator::{LocatorError, FALLBACK_CANDIDATE};
    use device_adapter::sim::{PerformedAction, ScreenFixture, SimElement};
    use device_adapter::Rect;
    use serde_json::json;

    const LOCATORS: &str = r#"
login:
  primary: { type: id, value: "com.app:id/login_old" }
  fallback_1: { type: text, value: "Log in" }
missing:
  primary: { type: id, value: "com.app:id/nothing" }
checkout:
  primary: { type: id, value: "com.app:id/buy_btn" }
"#;

    fn screen() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920)).with_element(
            SimElement::new("login", Rect::new(40, 1000, 1040, 1160))
                .with_resource_id("com.app:id/login")
                .with_class("android.widget.Button")
                .with_text("Log in"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn click_taps_center_and_reports_fallback() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse("click", &json!({"locator_key": "login"})).unwrap();

        let report = dispatcher.dispatch(&ctx(), &action, None).await.unwrap();

        assert_eq!(
            device.actions(),
            vec![PerformedAction::Gesture(Gesture::Tap { x: 540, y: 1080 })]
        );
        assert_eq!(report.healing.len(), 1);
        assert_eq!(report.healing[0].strategy_used, FALLBACK_CANDIDATE);
        assert_eq!(report.healing[0].candidate_index, 1);
    }

    fn renamed_checkout() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920)).with_element(
            SimElement::new("order", Rect::new(40, 1600, 1040, 1760))
                .with_resource_id("com.app:id/cart_submit")
                .with_class("android.widget.Button")
                .with_text("Place order")
                .clickable(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn click_heals_towards_explicit_expected_text() {
        let (dispatcher, device) = healing_dispatcher(renamed_checkout(), LOCATORS);
        let action = ActionSpec::parse(
            "click",
            &json!({"locator_key": "checkout", "expected_text": "Place order"}),
        )
        .unwrap();

        let report = dispatcher.dispatch(&ctx(), &action, None).await.unwrap();

        assert_eq!(
            device.actions(),
            vec![PerformedAction::Gesture(Gesture::Tap { x: 540, y: 1680 })]
        );
        assert_eq!(report.healing.len(), 1);
        assert_eq!(report.healing[0].strategy_used, "text_similarity");
    }

    #[tokio::test(start_paused = true)]
    async fn click_without_expected_text_cannot_heal_a_renamed_label() {
        let (dispatcher, device) = healing_dispatcher(renamed_checkout(), LOCATORS);
        let action = ActionSpec::parse("click", &json!({"locator_key": "checkout"})).unwrap();

        let err = dispatcher.dispatch(&ctx(), &action, None).await.unwrap_err();

        assert!(matches!(
            err,
            ActionError::Locator(LocatorError::ElementNotFound { .. })
        ));
        assert!(device.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_uses_configured_duration() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse(
            "long_press",
            &json!({"locator_key": "login", "duration_ms": 2500}),
        )
        .unwrap();

        dispatcher.dispatch(&ctx(), &action, None).await.unwrap();
        assert_eq!(
            device.actions(),
            vec![PerformedAction::Gesture(Gesture::LongPress {
                x: 540,
                y: 1080,
                duration_ms: 2500
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_element_fails_without_tapping() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse("click", &json!({"locator_key": "missing"})).unwrap();

        let err = dispatcher.dispatch(&ctx(), &action, None).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::Locator(LocatorError::ElementNotFound { .. })
        ));
        assert!(err.is_retryable());
        assert!(device.actions().is_empty());
    }
}
