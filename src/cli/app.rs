use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use super::commands::Commands;
use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, load_local_env_overrides, LoadedConfig};

pub async fn run() -> Result<()> {
    let env_overrides = load_local_env_overrides();
    let cli = CliArgs::parse();

    let LoadedConfig {
        config,
        path,
        found,
    } = load_config(cli.config.as_ref()).await?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.core.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    // only runs write a log file into the artifacts tree
    let log_dir = matches!(cli.command, Commands::Run(_)).then(|| config.core.artifacts_root.join("logs"));
    let _log_guard = init_logging(&level, cli.debug, cli.json_logs, log_dir.as_deref())?;

    info!("Starting mobiflow v{}", env!("CARGO_PKG_VERSION"));
    if env_overrides > 0 {
        info!(count = env_overrides, "Loaded environment overrides from local.env");
    }
    if found {
        info!("Loaded configuration from: {}", path.display());
    } else {
        warn!("Config file not found, using defaults: {}", path.display());
    }

    let cli_context = CliContext::new(config, path);
    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
