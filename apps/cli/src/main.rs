//! absorber CLI: ingest URLs and documents into one normalized text file.
//!
//! Fetches web pages (escalating to a headless browser when blocked),
//! extracts text from HTML, PDF, DOCX and images, and reports conflicting
//! claims across sources.

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
