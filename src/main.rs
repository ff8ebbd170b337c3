mod cli;
mod config;

use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use acn_engine::Engine;
use cli::Cli;
use config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let node_config = NodeConfig::load(&cli.config)?;

    let level = cli.log_level.as_deref().unwrap_or(&node_config.log_level);
    init_logging(level, node_config.log_file.as_deref());

    let engine_config = node_config.into_engine_config()?;
    let (engine, _handle) = Engine::new(engine_config);

    engine.run().await?;
    Ok(())
}

/// `tracing_subscriber::fmt` with an `EnvFilter`, writing to a file when
/// `log_file` is configured and to stderr otherwise (`spec.md §6`),
/// mirroring `sven`'s own `init_logging` in `main.rs`.
fn init_logging(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = log_file {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
