//! Command-name contract for log fields.

use crate::cli::parse::{Commands, ConfigCommands, EvalsCommands};

/// Dotted command name (e.g. "evals.compare", "config.show")
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Serve { .. } => "serve".to_string(),
        Commands::Models { .. } => "models".to_string(),
        Commands::Evals { command, .. } => format!("evals.{}", evals_command_name(command)),
        Commands::Config { command } => format!("config.{}", config_command_name(command)),
    }
}

pub fn evals_command_name(command: &EvalsCommands) -> &'static str {
    match command {
        EvalsCommands::List { .. } => "list",
        EvalsCommands::Compare { .. } => "compare",
        EvalsCommands::Run { .. } => "run",
    }
}

pub fn config_command_name(command: &ConfigCommands) -> &'static str {
    match command {
        ConfigCommands::Show { .. } => "show",
        ConfigCommands::Validate => "validate",
    }
}
