//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for hcimport using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// hcimport - healthcare store to research platform importer
#[derive(Parser, Debug)]
#[command(name = "hcimport")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "hcimport.toml", env = "HCIMPORT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HCIMPORT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import series, messages and resources into the destination project
    Import(commands::import::ImportArgs),

    /// Package a local directory of imaging files into archives
    Pack(commands::pack::PackArgs),

    /// Print the metadata embedded in an archive
    Inspect(commands::inspect::InspectArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
