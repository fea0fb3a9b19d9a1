//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Local web relay between cloud-drive accounts and an aria2 daemon.
#[derive(Parser, Debug)]
#[command(name = "pan-relay")]
#[command(author, version, about)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Directory holding aria2.json and the account cookie files
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Directory with the static frontend
    #[arg(long, default_value = "html")]
    pub html_dir: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
