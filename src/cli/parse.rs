//! CLI parse: clap types for shotcode. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shotcode CLI - screenshot-to-code generation server and output comparison
#[derive(Parser)]
#[command(name = "shotcode")]
#[command(about = "Multi-variant screenshot-to-code generation with an eval comparison engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over defaults and the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the generation server (websocket + eval routes)
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List the supported models and stacks
    Models {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Eval commands (list, compare, run)
    Evals {
        /// Eval data root holding inputs/ and results/ (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(subcommand)]
        command: EvalsCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum EvalsCommands {
    /// List the cases of one result set
    List {
        /// Result set directory
        #[arg(long)]
        set: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Compare two or more result sets case by case
    Compare {
        /// Result set directory (repeat for each set, at least two)
        #[arg(long = "set", required = true)]
        sets: Vec<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate a fresh result set per backend for every eval input
    Run {
        /// Backend id (repeat for several backends)
        #[arg(long = "backend", required = true)]
        backends: Vec<String>,
        /// Target stack id
        #[arg(long, default_value = "html_tailwind")]
        stack: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration with credentials masked
    Show {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Validate the effective configuration
    Validate,
}
