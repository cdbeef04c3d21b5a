// hcimport - Healthcare store to research platform importer
// Copyright (c) 2025 hcimport Contributors
// Licensed under the MIT License

use hcimport::cli::{Cli, Commands};
use hcimport::config::LoggingConfig;
use hcimport::logging::init_logging;
use clap::Parser;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (log_level, logging_config) = match logging_settings(&cli) {
        Ok(settings) => settings,
        Err(code) => process::exit(code),
    };
    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "hcimport - healthcare store to research platform importer"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                }
            }
            println!("\n⚠️  Shutdown signal received, finishing current item...");
            let _ = shutdown_tx.send(true);
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                println!("\n⚠️  Shutdown signal received, finishing current item...");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let exit_code = match execute_command(&cli, shutdown_rx).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    // flush file logs; process::exit skips destructors
    drop(guard);
    process::exit(exit_code);
}

/// Log level and logging settings
///
/// `import` takes both from the config file, with `--log-level` winning.
/// Other commands log to the console only.
fn logging_settings(cli: &Cli) -> Result<(String, LoggingConfig), i32> {
    if !matches!(cli.command, Commands::Import(_)) {
        let level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
        return Ok((level, LoggingConfig::default()));
    }
    match hcimport::config::load_config(&cli.config) {
        Ok(config) => {
            let level = cli
                .log_level
                .clone()
                .unwrap_or(config.application.log_level);
            Ok((level, config.logging))
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            Err(2)
        }
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, shutdown_signal: watch::Receiver<bool>) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Import(args) => args.execute(&cli.config, shutdown_signal).await,
        Commands::Pack(args) => args.execute(&cli.config).await,
        Commands::Inspect(args) => args.execute().await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
