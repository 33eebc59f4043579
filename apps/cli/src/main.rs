//! notefold CLI: consolidate a tree of markdown notes.
//!
//! Folds dated notes and their attachment folders into one corpus and splits
//! it into `summary.md`, `raw_notes.md` and `attachments.md`.

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