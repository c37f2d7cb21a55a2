use anyhow::Result;

use clap::{Parser, Subcommand};

pub mod generate_quote;

use generate_quote::GenerateQuoteArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: CliCommands,
}

#[derive(Subcommand)]
enum CliCommands {
    GenerateQuote(GenerateQuoteArgs),
}

fn main() -> Result<()> {
    env_logger::init();

    let opts = Cli::parse();

    match opts.command {
        CliCommands::GenerateQuote(args) => args.run(),
    }?;

    Ok(())
}
