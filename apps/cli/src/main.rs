//! attachport CLI: import remotely hosted media referenced by migrated posts.
//!
//! Finds images and documents that posts still load from their old host,
//! downloads them into the local upload directory, registers them as
//! attachments and rewrites the posts to the local copies.

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
