//! Offline inspector of a wallet transaction store.

use clap::Parser;

mod cli;
mod offline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::init_logging()?;
    let command = cli::Command::parse();
    command.exec().await
}
