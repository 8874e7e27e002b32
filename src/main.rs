use anyhow::{Context, Result};
use std::path::PathBuf;

use boundlog::{LogLevel, LoggerConfig};

const DEMO_LOG: &str = "boundlog-demo.log";

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    // Users can override fully via RUST_LOG if desired.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config() -> Result<LoggerConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => LoggerConfig::load(&path),
        None => Ok(LoggerConfig::new(LogLevel::OFF, DEMO_LOG)),
    }
}

fn main() -> Result<()> {
    init_logging();
    tracing::info!("boundlog version {}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    tracing::info!(
        "logging to {} (threshold {}, max {} bytes)",
        config.file_name,
        config.level,
        config.max_log_size
    );
    boundlog::configure_with(config);

    boundlog::info(
        "Entering demo with value={0} on {1}",
        &[&std::process::id(), &std::env::consts::OS],
    );
    if let Err(failure) = std::fs::read_to_string("/definitely/not/here").context("read demo input")
    {
        boundlog::error("Error happened", failure);
    }
    boundlog::flush();

    match boundlog::get_log_contents() {
        Ok(text) => print!("{}", text),
        Err(e) => eprintln!("log unavailable: {:#}", e),
    }
    Ok(())
}
