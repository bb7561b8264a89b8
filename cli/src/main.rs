mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{aggregate, density, join, polygonize};
use tracing_subscriber::EnvFilter;

/// Log to stderr; `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::Polygonize(args) => polygonize::run(&cli, args),
        Commands::Join(args) => join::run(&cli, args),
        Commands::Density(args) => density::run(&cli, args),
        Commands::Aggregate(args) => aggregate::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
