//! Navigation primitives - back, home and deep links

use crate::{
    errors::ActionError,
    primitives::DefaultActionDispatcher,
    spec::ActionSpec,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use device_adapter::DeviceControl;
use tokio::time::Instant;
use tracing::info;

/// Execute press_back, press_home or open_url
pub async fn execute_navigate(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    action: &ActionSpec,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let control = match action {
        ActionSpec::PressBack => DeviceControl::Back,
        ActionSpec::PressHome => DeviceControl::Home,
        ActionSpec::OpenUrl(p) => DeviceControl::OpenUrl {
            url: p.url.trim().to_string(),
        },
        other => {
            return Err(ActionError::Internal(format!(
                "'{}' is not a navigation action",
                other.name()
            )))
        }
    };

    info!(
        action_id = %ctx.action_id,
        control = ?control,
        "Executing navigation primitive"
    );
    dispatcher.adapter().perform_device_control(control).await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success(action.name(), started_at, latency_ms))
}
