//! kbchat CLI: ingest a corpus of travel records and chat over it.
//!
//! Answers are grounded in the highest-ranked records and, when enabled,
//! web search results from the generation backend.

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
