use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    mobiflow_cli::cli::run().await
}
