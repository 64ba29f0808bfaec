//! dirload CLI binary
//!
//! Command-line entry point for the bulk XML importer.

use clap::Parser;
use dirload::logging::init_logging;
use dirload::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::new(&cli) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error initializing importer: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(context.logging()) {
        eprintln!("Error initializing logging: {}", e);
        process::exit(1);
    }

    match context.execute(&cli) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
