use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skimmer::commands;

#[derive(Parser)]
#[command(name = "skimmer", about = "Subset laser-altimetry granules to regions of interest")]
struct Cli {
    /// Log filter, e.g. "info" or "skimmer=debug"
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one subsetting request against a column-dump replay source
    Subset(commands::subset::SubsetArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .init();

    match cli.command {
        Command::Subset(args) => commands::handle_subset(args),
    }
}
