//! drivedb CLI for vehicle support configurations and community guides.
//!
//! Manages the configuration tree (roots, forks, capabilities, linked
//! repositories) and the guide pipeline (fetch, merge, render) against a
//! local database.

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
