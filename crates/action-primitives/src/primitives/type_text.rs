//! Text input primitives - type into and clear input fields

use crate::{
    errors::ActionError,
    primitives::DefaultActionDispatcher,
    spec::{ElementParams, InputTextParams},
    types::{ActionReport, ExecCtx},
};
use action_locator::Resolution;
use chrono::Utc;
use device_adapter::TextInputOptions;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute input_text primitive
///
/// Steps:
/// 1. Resolve element via locator
/// 2. Replace (or append to) its content
/// 3. Submit if requested
/// 4. Generate action report
pub async fn execute_input_text(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &InputTextParams,
    resolved: Option<Resolution>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        locator_key = %params.locator_key,
        text_length = params.text.len(),
        submit = params.submit,
        "Executing input_text primitive"
    );

    let resolution = dispatcher
        .target(ctx, &params.locator_key, params.expected_text.as_deref(), resolved)
        .await?;
    dispatcher.ensure_active(ctx, "input_text")?;

    debug!("Typing {} characters into {}", params.text.chars().count(), resolution.handle);
    let options = TextInputOptions {
        clear_first: params.clear_first,
        submit: params.submit,
    };
    dispatcher
        .adapter()
        .perform_text_input(&resolution.handle, &params.text, &options)
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        latency_ms = latency_ms,
        "Input text completed successfully"
    );

    Ok(ActionReport::success("input_text", started_at, latency_ms).with_healing(resolution.healing))
}

/// Execute clear_text primitive
pub async fn execute_clear_text(
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
        "Executing clear_text primitive"
    );

    let resolution = dispatcher
        .target(ctx, &params.locator_key, params.expected_text.as_deref(), resolved)
        .await?;
    dispatcher.ensure_active(ctx, "clear_text")?;
    dispatcher
        .adapter()
        .perform_text_input(&resolution.handle, "", &TextInputOptions::default())
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success("clear_text", started_at, latency_ms).with_healing(resolution.healing))
}

#[cfg(test)]
mod tests {
    use crate::primitives::testkit::{ctx, dispatcher};
    use crate::primitives::ActionDispatcher;
    use crate::spec::ActionSpec;
    use device_adapter::sim::{ScreenFixture, SimElement};
    use device_adapter::Rect;
    use serde_json::json;

    const LOCATORS: &str = r#"
username:
  primary: { type: id, value: "com.app:id/username" }
"#;

    fn screen() -> ScreenFixture {
        ScreenFixture::new(Rect::new(0, 0, 1080, 1920)).with_element(
            SimElement::new("username", Rect::new(40, 400, 1040, 520))
                .with_resource_id("com.app:id/username")
                .with_class("android.widget.EditText")
                .with_text("old"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn input_replaces_text_by_default() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse(
            "input_text",
            &json!({"locator_key": "username", "text": "alice"}),
        )
        .unwrap();

        dispatcher.dispatch(&ctx(), &action, None).await.unwrap();
        assert_eq!(device.text_of("username").as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn input_can_append() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse(
            "input_text",
            &json!({"locator_key": "username", "text": "er", "clear_first": false}),
        )
        .unwrap();

        dispatcher.dispatch(&ctx(), &action, None).await.unwrap();
        assert_eq!(device.text_of("username").as_deref(), Some("older"));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_field() {
        let (dispatcher, device) = dispatcher(screen(), LOCATORS);
        let action = ActionSpec::parse("clear_text", &json!({"locator_key": "username"})).unwrap();

        let report = dispatcher.dispatch(&ctx(), &action, None).await.unwrap();
        assert_eq!(device.text_of("username").as_deref(), Some(""));
        assert!(report.healing.is_empty());
    }
}
