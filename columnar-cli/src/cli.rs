use crate::commands::Commands;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "columnar-cli")]
#[clap(about = "Inspect and dump columnar files", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}
