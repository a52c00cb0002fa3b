use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Configuration file; `config/default.toml` is used when present
    #[arg(long, short)]
    pub(crate) config: Option<PathBuf>,
    /// Print the stored logs with a summary of the retained window and exit
    #[arg(long)]
    pub(crate) summary: bool,
}
