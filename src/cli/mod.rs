pub mod args;
pub mod commands;

pub use args::{BatchArgs, ConfigArgs, ExecuteArgs, InfoArgs, OutputFormat};
use crate::core::config::LoadedConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
TOOL COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "ferrule")]
#[command(version = crate::VERSION)]
#[command(about = "Config-driven wrapper for invoking external tools safely")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: describe tools in ferrule.toml, check them with config validate, then execute one-offs or whole batches."
)]
pub struct Args {
    /// Path to the configuration file (default: search the usual locations)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG overrides it
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress informational console output
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Run one configured tool",
        long_about = "Execute validates the merged argument list, launches the tool with its configured environment and timeout, retries on failure when configured, and prints the captured result.",
        after_help = "Example:\n    ferrule execute flasher --image firmware.bin"
    )]
    Execute(ExecuteArgs),
    #[command(
        about = "Run many invocations of one tool from a file",
        long_about = "Batch reads one argument list per line, runs them with bounded concurrency, and reports per-item results in input order.",
        after_help = "Example:\n    ferrule batch flasher jobs.txt --max-concurrent 4 --fail-fast"
    )]
    Batch(BatchArgs),
    #[command(
        about = "Describe configured tools and their resolved settings",
        long_about = "Info shows a tool's executable, defaults, timeout after global fallback, and validation rules, or lists every configured tool.",
        after_help = "Example:\n    ferrule info flasher --format json"
    )]
    Info(InfoArgs),
    #[command(
        about = "Show, check, or generate configuration",
        long_about = "Config subcommands print the loaded configuration with its source path, report every configuration issue at once, or emit a commented example file.",
        after_help = "Examples:\n    ferrule config validate\n    ferrule config example > ferrule.toml"
    )]
    Config(ConfigArgs),
}

pub async fn run(args: Args, loaded: LoadedConfig, cancel: CancellationToken) -> crate::Result<()> {
    let context = commands::CommandContext::new(&args, loaded, cancel);
    match args.command {
        Command::Execute(execute_args) => commands::execute(&context, execute_args).await,
        Command::Batch(batch_args) => commands::batch(&context, batch_args).await,
        Command::Info(info_args) => commands::info(&context, info_args).await,
        Command::Config(config_args) => commands::config(&context, config_args).await,
    }
}
