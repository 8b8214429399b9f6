use clap::Parser;
use gcodelink::cli::{self, Cli};
use gcodelink::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging()?;

    cli::run(cli).await
}
