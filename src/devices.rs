//! Device sessions built from the framework config

use std::sync::Arc;

use action_flow::DeviceSession;
use action_locator::{LocatorCatalog, SelectorTransformer};
use anyhow::{bail, Context, Result};
use device_adapter::sim::{ScreenFixture, SimulatedDevice};
use device_adapter::DeviceId;
use tracing::{info, warn};

use crate::config::{DeviceConfig, FrameworkConfig};

/// Configured devices, optionally narrowed to `only` (udids), in config order.
pub fn select_devices<'a>(config: &'a FrameworkConfig, only: &[String]) -> Result<Vec<&'a DeviceConfig>> {
    if config.devices.is_empty() {
        bail!("No devices configured; add a `devices` section to the framework config");
    }
    for udid in only {
        if !config.devices.iter().any(|d| &d.udid == udid) {
            bail!("Device '{}' is not in the framework config", udid);
        }
    }
    Ok(config
        .devices
        .iter()
        .filter(|d| only.is_empty() || only.contains(&d.udid))
        .collect())
}

/// Connects a device and wraps it into a session sharing `catalog`.
pub fn open_session(
    device: &DeviceConfig,
    config: &FrameworkConfig,
    catalog: Arc<LocatorCatalog>,
) -> Result<DeviceSession> {
    let fixture = ScreenFixture::from_path(&device.fixture)
        .with_context(|| format!("Failed to load fixture {}", device.fixture.display()))?;
    let device_id = DeviceId::new(&device.udid);
    let adapter = Arc::new(SimulatedDevice::new(device_id.clone(), device.driver, fixture));

    let transformer = SelectorTransformer::new();
    let unusable = catalog.unusable_on(device.driver, &transformer);
    if !unusable.is_empty() {
        warn!(
            device = %device_id,
            backend = %device.driver,
            "locators with no candidate for this backend: {}",
            unusable.join(", ")
        );
    }

    let session = DeviceSession::new(
        device_id.clone(),
        adapter,
        catalog,
        config.healing.clone(),
        config.execution_defaults(),
    )
    .with_context(|| format!("Invalid session settings for device {}", device.udid))?
    .with_transformer(transformer);

    info!(device = %device_id, backend = %device.driver, "Device session ready");
    Ok(session)
}
