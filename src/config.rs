//! Framework configuration (`config/framework.yaml`)
//!
//! Durations are milliseconds. A handful of `MOBIFLOW_*` environment
//! variables override file values after loading.

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use action_flow::ExecutionDefaults;
use action_locator::HealingConfig;
use anyhow::{bail, Context, Result};
use mobiflow_core_types::Backend;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ENV_ARTIFACTS_ROOT: &str = "MOBIFLOW_ARTIFACTS_ROOT";
pub const ENV_RETRY_COUNT: &str = "MOBIFLOW_RETRY_COUNT";
pub const ENV_PARALLEL: &str = "MOBIFLOW_PARALLEL_EXECUTION";
pub const ENV_LOG_LEVEL: &str = "MOBIFLOW_LOG_LEVEL";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub core: CoreConfig,
    pub healing: HealingConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub artifacts_root: PathBuf,
    /// Step retries after the first attempt, unless a step overrides it.
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub parallel_execution: bool,
    pub default_timeout_ms: u64,
    pub check_interval_ms: u64,
    pub wait_timeout_ms: u64,
    pub test_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let defaults = ExecutionDefaults::default();
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            retry_count: defaults.retry_attempts,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            parallel_execution: false,
            default_timeout_ms: defaults.timeout.as_millis() as u64,
            check_interval_ms: defaults.check_interval.as_millis() as u64,
            wait_timeout_ms: defaults.wait_timeout.as_millis() as u64,
            test_timeout_ms: defaults.test_timeout.as_millis() as u64,
            log_level: None,
        }
    }
}

/// A device entry. Devices are simulated from a screen fixture file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub udid: String,
    #[serde(default = "default_driver")]
    pub driver: Backend,
    pub fixture: PathBuf,
}

fn default_driver() -> Backend {
    Backend::Uiautomator2
}

impl FrameworkConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse framework config")
    }

    /// Fixture paths in the file are relative to the file itself.
    pub fn resolve_paths(&mut self, base: &Path) {
        for device in &mut self.devices {
            if device.fixture.is_relative() {
                device.fixture = base.join(&device.fixture);
            }
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = env::var(ENV_ARTIFACTS_ROOT) {
            if !root.trim().is_empty() {
                info!("Artifacts root overridden by {}: {}", ENV_ARTIFACTS_ROOT, root);
                self.core.artifacts_root = PathBuf::from(root);
            }
        }

        if let Ok(raw) = env::var(ENV_RETRY_COUNT) {
            match raw.trim().parse::<u32>() {
                Ok(count) => self.core.retry_count = count,
                Err(err) => warn!(value = %raw, ?err, "ignoring invalid {}", ENV_RETRY_COUNT),
            }
        }

        if let Ok(raw) = env::var(ENV_PARALLEL) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.core.parallel_execution = true,
                "0" | "false" | "no" => self.core.parallel_execution = false,
                _ => warn!(value = %raw, "ignoring invalid {}", ENV_PARALLEL),
            }
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.core.log_level = Some(level);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.core.check_interval_ms == 0 {
            bail!("core.check_interval_ms must be greater than zero");
        }
        if self.core.test_timeout_ms == 0 {
            bail!("core.test_timeout_ms must be greater than zero");
        }
        self.healing
            .validate()
            .context("Invalid healing configuration")?;

        let mut seen = BTreeSet::new();
        for device in &self.devices {
            if device.udid.trim().is_empty() {
                bail!("device entry with empty udid");
            }
            if !seen.insert(device.udid.as_str()) {
                bail!("device '{}' is listed more than once", device.udid);
            }
        }
        Ok(())
    }

    pub fn execution_defaults(&self) -> ExecutionDefaults {
        ExecutionDefaults {
            timeout: Duration::from_millis(self.core.default_timeout_ms),
            retry_attempts: self.core.retry_count,
            retry_delay: Duration::from_millis(self.core.retry_delay_ms),
            check_interval: Duration::from_millis(self.core.check_interval_ms),
            wait_timeout: Duration::from_millis(self.core.wait_timeout_ms),
            test_timeout: Duration::from_millis(self.core.test_timeout_ms),
            ..ExecutionDefaults::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const CONFIG: &str = r#"
core:
  artifacts_root: out
  retry_count: 2
  parallel_execution: true
  wait_timeout_ms: 5000
healing:
  enabled: true
  fallback_attempts: 3
  strategies:
    - name: text_similarity
      threshold: 0.9
devices:
  - udid: emulator-5554
    fixture: fixtures/login.yaml
  - udid: "192.168.1.20:5555"
    driver: appium
    fixture: /abs/screen.yaml
"#;

    fn clear_env() {
        for key in [ENV_ARTIFACTS_ROOT, ENV_RETRY_COUNT, ENV_PARALLEL, ENV_LOG_LEVEL] {
            env::remove_var(key);
        }
    }

    #[test]
    fn parses_and_fills_defaults() {
        let mut config = FrameworkConfig::from_yaml_str(CONFIG).unwrap();
        config.resolve_paths(Path::new("/suite/config"));
        config.validate().unwrap();

        assert_eq!(config.core.artifacts_root, PathBuf::from("out"));
        assert_eq!(config.core.check_interval_ms, 500);
        assert_eq!(config.healing.fallback_attempts, 3);
        assert_eq!(config.devices[0].driver, Backend::Uiautomator2);
        assert_eq!(config.devices[1].driver, Backend::Appium);
        assert_eq!(
            config.devices[0].fixture,
            PathBuf::from("/suite/config/fixtures/login.yaml")
        );
        assert_eq!(config.devices[1].fixture, PathBuf::from("/abs/screen.yaml"));

        let defaults = config.execution_defaults();
        assert_eq!(defaults.retry_attempts, 2);
        assert_eq!(defaults.wait_timeout, Duration::from_secs(5));
        assert_eq!(defaults.retry_delay, Duration::from_secs(2));
        assert!(defaults.blocking);
    }

    #[test]
    fn rejects_bad_values() {
        let zero = FrameworkConfig::from_yaml_str("core: { check_interval_ms: 0 }").unwrap();
        assert!(zero.validate().is_err());

        let duplicate = FrameworkConfig::from_yaml_str(
            "devices: [{udid: a, fixture: x.yaml}, {udid: a, fixture: y.yaml}]",
        )
        .unwrap();
        assert!(duplicate.validate().unwrap_err().to_string().contains("more than once"));

        let threshold = FrameworkConfig::from_yaml_str(
            "healing: { strategies: [{ name: text_similarity, threshold: 1.5 }] }",
        )
        .unwrap();
        assert!(threshold.validate().is_err());

        assert!(FrameworkConfig::from_yaml_str("devices: [{udid: a, driver: espresso, fixture: x}]").is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_apply_after_file() {
        clear_env();
        env::set_var(ENV_ARTIFACTS_ROOT, "/tmp/mobiflow");
        env::set_var(ENV_RETRY_COUNT, "4");
        env::set_var(ENV_PARALLEL, "false");

        let mut config = FrameworkConfig::from_yaml_str(CONFIG).unwrap();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.core.artifacts_root, PathBuf::from("/tmp/mobiflow"));
        assert_eq!(config.core.retry_count, 4);
        assert!(!config.core.parallel_execution);
    }

    #[test]
    #[serial]
    fn invalid_env_values_are_ignored() {
        clear_env();
        env::set_var(ENV_RETRY_COUNT, "many");
        env::set_var(ENV_PARALLEL, "sometimes");

        let mut config = FrameworkConfig::from_yaml_str(CONFIG).unwrap();
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.core.retry_count, 2);
        assert!(config.core.parallel_execution);
    }
}
