#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;
mod prompt;

use bridge_traits::LogLevel;
use clap::Parser;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

use crate::cli::Cli;

fn logging_config(verbose: u8) -> LoggingConfig {
    let level = match verbose {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(level)
        .with_target(verbose > 1);

    match std::env::var("RUST_LOG") {
        Ok(filter) if !filter.trim().is_empty() => config.with_filter(filter),
        _ => config,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(logging_config(cli.global.verbose)) {
        eprintln!("warning: {}", e);
    }

    if let Err(e) = commands::run(cli.global, cli.command).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
