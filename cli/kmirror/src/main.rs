//! kmirror - copy the images a Kubernetes release needs into a private registry.
//!
//! Resolves the component image tags for a Kubernetes version, checks which
//! of them the mirror registry already has, and pulls, retags and pushes the
//! rest through the local container engine.

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod error;
mod logging;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_format) {
        error::print_error(&e);
        std::process::exit(1);
    }

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
