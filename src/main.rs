use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = trove::cli::Cli::parse();
    trove::run_blocking(cli)
}
