use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Prints `value` as JSON/YAML, or runs `human` for the human format.
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, human: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Human => human(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
