use anyhow::Result;
use landing_chat::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
