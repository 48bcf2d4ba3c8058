use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Args)]
pub struct ExecuteArgs {
    /// Tool name as configured in ferrule.toml
    #[arg(value_name = "TOOL")]
    pub tool: String,

    /// Arguments appended after the tool's default_args
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Extra KEY=VALUE environment for the child (config values still win)
    #[arg(
        long = "env",
        value_name = "KEY=VALUE",
        help_heading = "Execution Overrides"
    )]
    pub env: Vec<String>,

    /// Working directory override for the child process
    #[arg(long, value_name = "DIR", help_heading = "Execution Overrides")]
    pub cwd: Option<PathBuf>,

    /// Timeout override in seconds for this invocation
    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Execution Overrides"
    )]
    pub timeout: Option<u64>,

    /// Validate and print the resolved command without launching it
    #[arg(long)]
    pub dry_run: bool,

    /// Write the result record as JSON to this file
    #[arg(long, value_name = "FILE", help_heading = "Output Options")]
    pub save_output: Option<PathBuf>,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(
        long,
        default_value = "text",
        value_name = "FORMAT",
        help_heading = "Output Options"
    )]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Tool name as configured in ferrule.toml
    #[arg(value_name = "TOOL")]
    pub tool: String,

    /// Batch file with one argument list per line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Concurrency limit (default: settings.max_concurrent_jobs)
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Execution Overrides"
    )]
    pub max_concurrent: Option<u64>,

    /// Stop starting new items after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Write the full batch summary as JSON to this file
    #[arg(long, value_name = "FILE", help_heading = "Output Options")]
    pub save_results: Option<PathBuf>,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(
        long,
        default_value = "text",
        value_name = "FORMAT",
        help_heading = "Output Options"
    )]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Tool to describe; omit to list every configured tool
    #[arg(value_name = "TOOL")]
    pub tool: Option<String>,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the loaded configuration and where it came from
    Show,
    /// Check the configuration and report every issue found
    Validate,
    /// Print a commented example ferrule.toml
    Example,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON payload suitable for downstream tooling
    Json,
}
