//! Device control primitives - app lifecycle, orientation and key presses

use crate::{
    errors::ActionError,
    primitives::DefaultActionDispatcher,
    spec::ActionSpec,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use device_adapter::DeviceControl;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute launch_app, stop_app, set_orientation or press_key
///
/// `launch_app` with `force_stop` stops the package first; data clearing
/// is carried on the launch request for the driver to honour.
pub async fn execute_device_control(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    action: &ActionSpec,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let mut controls = Vec::with_capacity(2);
    match action {
        ActionSpec::LaunchApp(p) => {
            if p.force_stop {
                debug!("Force stopping {}", p.app_package);
                controls.push(DeviceControl::StopApp {
                    package: p.app_package.clone(),
                });
            }
            controls.push(DeviceControl::LaunchApp {
                package: p.app_package.clone(),
                force_stop: p.force_stop,
                clear_data: p.clear_data,
            });
        }
        ActionSpec::StopApp(p) => controls.push(DeviceControl::StopApp {
            package: p.app_package.clone(),
        }),
        ActionSpec::SetOrientation(p) => controls.push(DeviceControl::SetOrientation {
            orientation: p.orientation.clone(),
        }),
        ActionSpec::PressKey(p) => controls.push(DeviceControl::PressKey {
            key: p.key.trim().to_string(),
        }),
        other => {
            return Err(ActionError::Internal(format!(
                "'{}' is not a device control action",
                other.name()
            )))
        }
    }

    info!(
        action_id = %ctx.action_id,
        action = action.name(),
        "Executing device control primitive"
    );
    for control in controls {
        dispatcher.ensure_active(ctx, action.name())?;
        dispatcher.adapter().perform_device_control(control).await?;
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success(action.name(), started_at, latency_ms))
}

#[cfg(test)]
mod tests {
    use crate::primitives::testkit::{ctx, dispatcher};
    use crate::primitives::ActionDispatcher;
    use crate::spec::ActionSpec;
    use device_adapter::sim::{PerformedAction, ScreenFixture};
    use device_adapter::{DeviceControl, Rect};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn force_stop_precedes_launch() {
        let (dispatcher, device) = dispatcher(ScreenFixture::new(Rect::new(0, 0, 1080, 1920)), "{}");
        let action = ActionSpec::parse(
            "launch_app",
            &json!({"app_package": "com.android.settings", "force_stop": true}),
        )
        .unwrap();

        dispatcher.dispatch(&ctx(), &action, None).await.unwrap();

        assert_eq!(device.foreground_app().as_deref(), Some("com.android.settings"));
        assert!(matches!(
            device.actions().first(),
            Some(PerformedAction::Control(DeviceControl::StopApp { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn orientation_and_keys_reach_the_device() {
        let (dispatcher, device) = dispatcher(ScreenFixture::new(Rect::new(0, 0, 1080, 1920)), "{}");
        for (name, params) in [
            ("set_orientation", json!({"orientation": "LANDSCAPE"})),
            ("press_key", json!({"key": "enter"})),
            ("stop_app", json!({"app_package": "com.android.settings"})),
        ] {
            let action = ActionSpec::parse(name, &params).unwrap();
            dispatcher.dispatch(&ctx(), &action, None).await.unwrap();
        }
        assert_eq!(device.orientation().as_deref(), Some("landscape"));
        assert_eq!(device.actions().len(), 3);
    }
}
