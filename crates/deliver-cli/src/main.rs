//! deliver - resolve, build and release developer packages

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deliver_cli::Cli;
use deliver_cli::cmd;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        return cmd::list::list(&cli.packages, cli.json);
    }

    let options = cmd::deploy::DeployOptions {
        target: cli.target(),
        yes: cli.yes,
        dry_run: cli.dry_run,
        json: cli.json,
    };
    cmd::deploy::deploy(&cli.packages, &options)
}
