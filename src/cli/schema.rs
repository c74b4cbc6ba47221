use std::path::PathBuf;

use action_flow::StepConfigs;
use action_gate::AssertionSpec;
use action_locator::HealingConfig;
use action_primitives::ActionSpec;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::fs;

#[derive(Args, Clone, Debug)]
pub struct SchemaArgs {
    /// Which document to describe
    #[arg(value_enum)]
    pub target: SchemaTarget,

    /// Write to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SchemaTarget {
    /// `action` + `parameters` of an action step
    Actions,
    /// `assertion` + `parameters` of an assertion step
    Assertions,
    /// Per-step `configs`
    StepConfigs,
    /// The `healing` section of the framework config
    Healing,
}

pub fn schema_json(target: SchemaTarget) -> Result<String> {
    let schema = match target {
        SchemaTarget::Actions => schema_for!(ActionSpec),
        SchemaTarget::Assertions => schema_for!(AssertionSpec),
        SchemaTarget::StepConfigs => schema_for!(StepConfigs),
        SchemaTarget::Healing => schema_for!(HealingConfig),
    };
    Ok(serde_json::to_string_pretty(&schema)?)
}

pub async fn cmd_schema(args: SchemaArgs) -> Result<()> {
    let json = schema_json(args.target)?;
    match args.output {
        Some(path) => {
            fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Schema written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_configs_schema_lists_every_override() {
        let json = schema_json(SchemaTarget::StepConfigs).unwrap();
        for field in ["timeout", "retry_attempts", "check_interval", "wait_timeout", "blocking", "retry_delay"] {
            assert!(json.contains(field), "missing {field}");
        }
    }

    #[test]
    fn action_schema_names_actions() {
        let json = schema_json(SchemaTarget::Actions).unwrap();
        assert!(json.contains("swipe_until_visible"));
        assert!(json.contains("launch_app"));
    }
}
