//! CLI route: single route table and run context. Dispatches to the server, the eval engine
//! and presentation.

use crate::catalog::{catalog, BackendModel, Stack};
use crate::cli::help::command_name;
use crate::cli::parse::{Commands, ConfigCommands, EvalsCommands};
use crate::cli::presentation::{
    format_catalog_json, format_catalog_text, format_cases_json, format_cases_text,
    format_comparison_json, format_comparison_text, format_run_report_json,
    format_run_report_text, to_pretty_json, OutputFormat,
};
use crate::config::{AppConfig, ConfigLoader};
use crate::error::ApiError;
use crate::evals::{self, EvalsConfig, RunEvalsDriver};
use crate::server::{self, AppState};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: the effective configuration.
pub struct RunContext {
    config: AppConfig,
}

impl RunContext {
    /// Load configuration from every layer, with `config_path` as the explicit file layer.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = config_path {
            loader = loader.with_file(path);
        }
        Ok(Self::from_config(loader.load()?))
    }

    pub fn from_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(command = %name, elapsed_ms, "Command finished"),
            Err(e) => warn!(command = %name, elapsed_ms, error = %e, "Command failed"),
        }
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Serve { host, port } => {
                let mut config = self.config.clone();
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
                server::serve(AppState::from_config(config)?).await?;
                Ok(String::new())
            }
            Commands::Models { format } => {
                let listing = catalog();
                Ok(match format.parse::<OutputFormat>()? {
                    OutputFormat::Text => format_catalog_text(&listing),
                    OutputFormat::Json => format_catalog_json(&listing),
                })
            }
            Commands::Evals { dir, command } => {
                let mut evals_config = self.config.evals.clone();
                if let Some(dir) = dir {
                    evals_config.dir = dir.clone();
                }
                self.handle_evals_command(evals_config, command).await
            }
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    async fn handle_evals_command(
        &self,
        evals_config: EvalsConfig,
        command: &EvalsCommands,
    ) -> Result<String, ApiError> {
        let inputs_dir = evals_config.inputs_dir();
        match command {
            EvalsCommands::List { set, format } => {
                let format = format.parse::<OutputFormat>()?;
                let cases = evals::list_single(&inputs_dir, set)?;
                Ok(match format {
                    OutputFormat::Text => format_cases_text(set, &cases),
                    OutputFormat::Json => format_cases_json(set, &cases),
                })
            }
            EvalsCommands::Compare { sets, format } => {
                let format = format.parse::<OutputFormat>()?;
                let comparison = evals::compare_sets(&inputs_dir, sets)?;
                Ok(match format {
                    OutputFormat::Text => format_comparison_text(&comparison),
                    OutputFormat::Json => format_comparison_json(&comparison),
                })
            }
            EvalsCommands::Run {
                backends,
                stack,
                format,
            } => {
                let format = format.parse::<OutputFormat>()?;
                let backends = backends
                    .iter()
                    .map(|id| id.parse::<BackendModel>())
                    .collect::<Result<Vec<_>, _>>()?;
                let stack: Stack = stack.parse()?;

                let mut config = self.config.clone();
                config.evals = evals_config;
                let state = AppState::from_config(config)?;
                let driver = RunEvalsDriver::new(
                    state.orchestrator(),
                    state.config().evals.clone(),
                    state.config().credentials.clone(),
                );
                let report = driver.run(&backends, stack).await?;
                Ok(match format {
                    OutputFormat::Text => format_run_report_text(&report),
                    OutputFormat::Json => format_run_report_json(&report),
                })
            }
        }
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, ApiError> {
        match command {
            ConfigCommands::Show { format } => {
                let redacted = self.config.redacted();
                match format.trim().to_ascii_lowercase().as_str() {
                    "toml" => redacted.to_toml(),
                    "json" => Ok(to_pretty_json(&redacted)),
                    other => Err(ApiError::InvalidRequest(format!(
                        "Invalid format: {} (must be 'toml' or 'json')",
                        other
                    ))),
                }
            }
            // Loading already validated; report the layers that were in play
            ConfigCommands::Validate => {
                let mut output = String::from("Configuration is valid.\n");
                if let Some(path) = crate::config::global_config_path().filter(|p| p.exists()) {
                    output.push_str(&format!("Global config: {}\n", path.display()));
                }
                let families = self.config.credentials.families();
                if families.is_empty() {
                    output.push_str("Backends: none configured (requests must carry keys)\n");
                } else {
                    let names: Vec<&str> = families.iter().map(|f| f.name()).collect();
                    output.push_str(&format!("Backends: {}\n", names.join(", ")));
                }
                Ok(output)
            }
        }
    }
}
