use clap::Subcommand;

use super::export::ExportArgs;
use super::run::RunArgs;
use super::schema::SchemaArgs;
use super::selectors::SelectorsArgs;
use super::validate::{ListArgs, ValidateArgs};

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run test cases on the configured devices
    Run(RunArgs),

    /// Load and type-check a suite without running it
    Validate(ValidateArgs),

    /// List test case ids in run order
    List(ListArgs),

    /// Show the selector registry per backend
    Selectors(SelectorsArgs),

    /// Print JSON schema for suite files
    Schema(SchemaArgs),

    /// Export recorded results
    Export(ExportArgs),
}
