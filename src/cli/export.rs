use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use tokio::fs;

use super::context::CliContext;
use crate::report::{export_csv, load_results};

#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    /// Results file (defaults to <artifacts_root>/results/results.json)
    #[arg(short, long, value_name = "FILE")]
    pub results: Option<PathBuf>,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Export format
    #[arg(short, long, default_value = "csv")]
    pub format: DataFormat,

    /// Only export this run
    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DataFormat {
    /// One row per step
    Csv,
    /// Test results as a JSON array
    Json,
}

pub async fn cmd_export(args: ExportArgs, ctx: &CliContext) -> Result<()> {
    let source = args
        .results
        .unwrap_or_else(|| ctx.artifacts(false).results_file());
    let mut results = load_results(&source).await?;
    if let Some(run_id) = &args.run_id {
        results.retain(|r| &r.run_id == run_id);
    }

    match args.format {
        DataFormat::Csv => {
            let rows = export_csv(&results, &args.output)?;
            println!("Exported {} step rows to {}", rows, args.output.display());
        }
        DataFormat::Json => {
            fs::write(&args.output, serde_json::to_vec_pretty(&results)?).await?;
            println!("Exported {} tests to {}", results.len(), args.output.display());
        }
    }
    Ok(())
}
