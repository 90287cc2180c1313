//! CloudMouse CLI: documentation pipeline and production provisioning.
//!
//! Sanitizes generated SDK reference pages, imports them into the CMS,
//! exports CMS pages to Markdown, and flashes and registers devices.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
