use anyhow::{Context, Result};
use clap::Args;
use mobiflow_core_types::Backend;
use serde::Serialize;

use super::output::{emit, OutputFormat};
use action_locator::SelectorTransformer;

#[derive(Args, Clone, Debug)]
pub struct SelectorsArgs {
    /// Only show selectors usable on this backend (appium, uiautomator2)
    #[arg(short, long)]
    pub backend: Option<String>,
}

#[derive(Debug, Serialize)]
struct SelectorRow {
    selector_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    appium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uiautomator2: Option<String>,
}

pub async fn cmd_selectors(args: SelectorsArgs, output: OutputFormat) -> Result<()> {
    let backend = args
        .backend
        .as_deref()
        .map(|name| name.parse::<Backend>())
        .transpose()
        .context("Unknown backend")?;

    let rows: Vec<SelectorRow> = SelectorTransformer::new()
        .describe()
        .into_iter()
        .filter(|(_, appium, u2)| match backend {
            Some(Backend::Appium) => appium.is_some(),
            Some(Backend::Uiautomator2) => u2.is_some(),
            None => true,
        })
        .map(|(selector_type, appium, uiautomator2)| SelectorRow {
            selector_type,
            appium,
            uiautomator2,
        })
        .collect();

    emit(output, &rows, || {
        println!("{:<22} {:<22} {}", "SELECTOR", "APPIUM", "UIAUTOMATOR2");
        for row in &rows {
            println!(
                "{:<22} {:<22} {}",
                row.selector_type,
                row.appium.as_deref().unwrap_or("-"),
                row.uiautomator2.as_deref().unwrap_or("-")
            );
        }
    })
}
