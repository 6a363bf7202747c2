use clap::Parser;

mod cli;
mod commands;
mod error;

use cli::Cli;
pub use error::AppError;

fn main() {
    env_logger::init();

    let args = Cli::parse();

    if let Err(err) = args.command.run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
