use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::FrameworkConfig;

const LOCAL_ENV_FILE: &str = "config/local.env";
const DEFAULT_CONFIG_FILE: &str = "config/framework.yaml";
const LOG_FILE: &str = "mobiflow.log";

/// Sets `KEY=value` pairs from `config/local.env` unless already set.
/// Returns the number of variables applied.
pub fn load_local_env_overrides() -> usize {
    let path = Path::new(LOCAL_ENV_FILE);
    let Ok(contents) = stdfs::read_to_string(path) else {
        return 0;
    };

    let mut applied = 0;
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var(key).is_ok() {
            continue;
        }
        env::set_var(key, unquote(value.trim()));
        applied += 1;
    }
    applied
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Console layer plus an optional file layer under `log_dir`. The returned
/// guard must stay alive for file logs to be flushed.
pub fn init_logging(
    level: &str,
    debug: bool,
    json: bool,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            stdfs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: FrameworkConfig,
    pub path: PathBuf,
    pub found: bool,
}

/// Priority: `--config` > `./config/framework.yaml` >
/// `<config dir>/mobiflow/framework.yaml`. A missing file yields defaults;
/// `MOBIFLOW_*` overrides are applied either way.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            let local_config = PathBuf::from(DEFAULT_CONFIG_FILE);
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("mobiflow");
                path.push("framework.yaml");
                path
            }
        }
    };

    let (mut config, found) = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;
        let mut config = FrameworkConfig::from_yaml_str(&content)?;
        if let Some(base) = config_path.parent() {
            config.resolve_paths(base);
        }
        (config, true)
    } else {
        (FrameworkConfig::default(), false)
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(LoadedConfig {
        config,
        path: config_path,
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("\"abc"), "\"abc");
        assert_eq!(unquote("plain"), "plain");
    }

    #[tokio::test]
    #[serial]
    async fn explicit_config_is_loaded_with_relative_fixtures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("framework.yaml");
        std::fs::write(
            &path,
            "core: { retry_count: 1 }\ndevices:\n  - { udid: emulator-5554, fixture: fixtures/home.yaml }\n",
        )
        .unwrap();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert!(loaded.found);
        assert_eq!(loaded.config.core.retry_count, 1);
        assert_eq!(
            loaded.config.devices[0].fixture,
            dir.path().join("fixtures/home.yaml")
        );
    }

    #[tokio::test]
    #[serial]
    async fn missing_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.yaml"))).await.unwrap();
        assert!(!loaded.found);
        assert!(loaded.config.devices.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("framework.yaml");
        std::fs::write(&path, "core: { check_interval_ms: 0 }\n").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}
