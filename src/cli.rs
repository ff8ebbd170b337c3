//! Command-line surface: a config path plus a log-level override, mirroring
//! `sven`'s top-level `Cli { config, verbose }` split (`spec.md §6`).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "acn-node",
    about = "Agent Communication Network overlay routing node",
    version
)]
pub struct Cli {
    /// Path to the node's YAML configuration file.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Override the configured log level (trace|debug|info|warn|error).
    #[arg(long)]
    pub log_level: Option<String>,
}
