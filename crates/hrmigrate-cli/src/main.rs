//! hrmigrate CLI - Main entry point

use clap::Parser;
use hrmigrate_cli::{commands, Cli, Commands};
use hrmigrate_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("hrmigrate")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI still works without logging
    let _log_guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: Cli) -> hrmigrate_cli::Result<()> {
    match cli.command {
        Commands::Dispatch(args) => commands::dispatch::run(args).await,
        Commands::Backup { bucket } => commands::backup::run_backup(bucket).await,
        Commands::Restore { bucket } => commands::backup::run_restore(bucket).await,
    }
}
