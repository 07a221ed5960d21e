//! heirdesk CLI: bank inheritance procedure facts on demand.
//!
//! Resolves a bank from a free-text question, serves its cached facts or
//! acquires them from the bank's page (falling back to search snippets), and
//! keeps the registry on disk.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
