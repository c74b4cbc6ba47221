use super::env::CliArgs;
use super::export::cmd_export;
use super::run::cmd_run;
use super::schema::cmd_schema;
use super::selectors::cmd_selectors;
use super::validate::{cmd_list, cmd_validate};
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, cli.output).await,
        Commands::Validate(args) => cmd_validate(args, ctx, cli.output).await,
        Commands::List(args) => cmd_list(args, cli.output).await,
        Commands::Selectors(args) => cmd_selectors(args, cli.output).await,
        Commands::Schema(args) => cmd_schema(args).await,
        Commands::Export(args) => cmd_export(args, ctx).await,
    }
}
