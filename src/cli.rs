//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; a single route table dispatches to the server and eval engine.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, EvalsCommands};
pub use presentation::{
    format_catalog_json, format_catalog_text, format_cases_json, format_cases_text,
    format_comparison_json, format_comparison_text, format_run_report_json,
    format_run_report_text, OutputFormat,
};
pub use route::RunContext;
