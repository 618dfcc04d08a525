//! finchctl CLI entry point.

use clap::Parser;
use owo_colors::OwoColorize as _;

use finchctl::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        if console::Term::stderr().is_term() {
            eprintln!("{} {e}", "Error:".red());
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}
