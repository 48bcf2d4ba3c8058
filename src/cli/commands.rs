use crate::{
    cli::args::{BatchArgs, ConfigAction, ConfigArgs, ExecuteArgs, InfoArgs, OutputFormat},
    cli::Args as CliArgs,
    core::{
        batch::{parse_batch_file, BatchJob, BatchRunner, BatchSummary},
        config::{
            ConfigLoader, FerruleConfig, LoadedConfig, Settings, ToolConfig, EXAMPLE_CONFIG,
        },
        error::{AppError, ConsoleReporter, ErrorReporter},
        invoker::{
            resolve_executable, ExecutionOverrides, InvocationResult, Invoker, RenderedInvocation,
        },
        types::{ErrorCategory, ItemStatus},
    },
    Result,
};
use anyhow::Context;
use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared state threaded through every command, so reporting and
/// cancellation never rely on process-global state.
pub struct CommandContext {
    pub loaded: LoadedConfig,
    pub reporter: Arc<dyn ErrorReporter>,
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(args: &CliArgs, loaded: LoadedConfig, cancel: CancellationToken) -> Self {
        let reporter: Arc<dyn ErrorReporter> =
            Arc::new(ConsoleReporter::new(args.verbose, args.quiet));
        Self {
            loaded,
            reporter,
            cancel,
        }
    }

    fn config(&self) -> &FerruleConfig {
        &self.loaded.config
    }

    fn invoker(&self) -> Invoker {
        Invoker::new(
            self.config().settings.clone(),
            Arc::clone(&self.reporter),
        )
    }
}

pub async fn execute(context: &CommandContext, args: ExecuteArgs) -> Result<()> {
    tracing::info!(tool = %args.tool, "executing tool");

    let tool = context.config().tool(&args.tool)?;
    let overrides = build_overrides(&args)?;
    let invoker = context.invoker();

    if args.dry_run {
        invoker.validate(tool, &args.args)?;
        let rendered = invoker.render(tool, &args.args, &overrides);
        match args.format {
            OutputFormat::Text => print!("{}", render_dry_run_text(&rendered)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rendered)?),
        }
        return Ok(());
    }

    let result = tokio::select! {
        result = invoker.execute(tool, &args.args, &overrides) => result?,
        _ = context.cancel.cancelled() => {
            return Err(interrupted("execution").into());
        }
    };

    tracing::info!(
        tool = %result.tool_name,
        success = result.success,
        duration_ms = result.duration_ms,
        attempts = result.attempts,
        "invocation finished"
    );

    match args.format {
        OutputFormat::Text => print!("{}", render_result_text(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    if let Some(ref path) = args.save_output {
        save_json(path, &result)?;
        context
            .reporter
            .report_info(&format!("result written to {}", path.display()));
    }

    result.error_for_status()?;
    Ok(())
}

pub async fn batch(context: &CommandContext, args: BatchArgs) -> Result<()> {
    tracing::info!(tool = %args.tool, file = %args.file.display(), "starting batch");

    let config = context.config();
    let tool = config.tool(&args.tool)?;
    let items = parse_batch_file(&args.file)?;

    let job = BatchJob {
        items,
        max_concurrent: args
            .max_concurrent
            .map(|n| n as usize)
            .unwrap_or(config.settings.max_concurrent_jobs),
        fail_fast: args.fail_fast,
    };

    let invoker = Arc::new(context.invoker());
    let runner = BatchRunner::new(invoker, Arc::clone(&context.reporter), context.cancel.clone());
    let summary = runner.run(tool, job).await?;

    match args.format {
        OutputFormat::Text => print!("{}", render_summary_text(&summary)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    if let Some(ref path) = args.save_results {
        save_json(path, &summary)?;
        context
            .reporter
            .report_info(&format!("batch results written to {}", path.display()));
    }

    summary_outcome(&summary)
}

pub async fn info(context: &CommandContext, args: InfoArgs) -> Result<()> {
    let config = context.config();

    if let Some(ref name) = args.tool {
        let tool = config.tool(name)?;
        match args.format {
            OutputFormat::Text => print!("{}", render_tool_info(tool, &config.settings)),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&tool_info_json(tool, &config.settings))?
            ),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Text => {
            print!("{}", render_settings_text(&config.settings));
            if config.tools.is_empty() {
                println!("no tools configured");
            }
            for tool in config.tools.values() {
                println!();
                print!("{}", render_tool_info(tool, &config.settings));
            }
        }
        OutputFormat::Json => {
            let tools: Vec<serde_json::Value> = config
                .tools
                .values()
                .map(|tool| tool_info_json(tool, &config.settings))
                .collect();
            let payload = serde_json::json!({
                "settings": config.settings,
                "tools": tools,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

pub async fn config(context: &CommandContext, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => show_config(context),
        ConfigAction::Validate => validate_config(context),
        ConfigAction::Example => {
            print!("{}", EXAMPLE_CONFIG);
            Ok(())
        }
    }
}

fn show_config(context: &CommandContext) -> Result<()> {
    match context.loaded.path {
        Some(ref path) => println!("# loaded from {}", path.display()),
        None => println!("# built-in defaults (no ferrule.toml found)"),
    }
    print!("{}", toml::to_string_pretty(context.config())?);
    println!();
    println!("# environment overrides:");
    for doc in ConfigLoader::env_var_documentation() {
        println!("#   {}", doc);
    }
    Ok(())
}

fn validate_config(context: &CommandContext) -> Result<()> {
    let issues = ConfigLoader::config_issues(context.config());
    if issues.is_empty() {
        println!(
            "configuration OK ({} tool(s) configured)",
            context.config().tools.len()
        );
        return Ok(());
    }
    for issue in &issues {
        println!("- {}", issue);
    }
    let mut error = AppError::new(
        ErrorCategory::ConfigurationError,
        format!("configuration has {} issue(s)", issues.len()),
    )
    .with_code("CFG-003");
    error.add_context("issue_count", &issues.len().to_string());
    Err(error.into())
}

fn build_overrides(args: &ExecuteArgs) -> Result<ExecutionOverrides> {
    let mut env = IndexMap::new();
    for pair in &args.env {
        let (key, value) = parse_env_pair(pair)?;
        env.insert(key, value);
    }
    Ok(ExecutionOverrides {
        env,
        cwd: args.cwd.clone(),
        timeout: args.timeout.map(Duration::from_secs),
    })
}

fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid --env '{}': expected KEY=VALUE", pair),
        )
        .with_code("CLI-001")
        .into()),
    }
}

fn interrupted(action: &str) -> AppError {
    AppError::new(
        ErrorCategory::Interrupted,
        format!("{} interrupted before completion", action),
    )
    .with_code("CLI-002")
}

fn summary_outcome(summary: &BatchSummary) -> Result<()> {
    if summary.interrupted {
        let mut error = interrupted("batch");
        error.add_context("finished", &(summary.succeeded + summary.failed).to_string());
        error.add_context("total", &summary.total.to_string());
        return Err(error.into());
    }
    match summary.exit_code() {
        0 => Ok(()),
        7 => Err(AppError::new(
            ErrorCategory::TimeoutError,
            format!("batch finished with {} timed-out item(s)", summary.failed),
        )
        .with_code("BAT-005")
        .into()),
        _ => Err(AppError::new(
            ErrorCategory::ExecutionError,
            format!(
                "batch finished with {} failed and {} skipped item(s)",
                summary.failed, summary.skipped
            ),
        )
        .with_code("BAT-006")
        .into()),
    }
}

fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(path, payload.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn render_result_text(result: &InvocationResult) -> String {
    let status = if result.success {
        "succeeded".to_string()
    } else if result.timed_out {
        "timed out".to_string()
    } else {
        format!(
            "failed (exit code {})",
            result
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    };

    let mut out = format!(
        "tool '{}' {} in {}ms after {} attempt(s)\n",
        result.tool_name, status, result.duration_ms, result.attempts
    );
    out.push_str(&format!("command: {}\n", shell_words::join(&result.command)));
    if !result.stdout.is_empty() {
        out.push_str("--- stdout ---\n");
        out.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            out.push('\n');
        }
    }
    if !result.stderr.is_empty() {
        out.push_str("--- stderr ---\n");
        out.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn render_dry_run_text(rendered: &RenderedInvocation) -> String {
    let mut out = format!("tool '{}' (dry run)\n", rendered.tool_name);
    let resolved = rendered
        .resolved_path
        .as_ref()
        .map(|path| format!("resolved: {}", path.display()))
        .unwrap_or_else(|| "not found".to_string());
    out.push_str(&format!(
        "executable: {} ({})\n",
        rendered.executable, resolved
    ));

    let mut command = Vec::with_capacity(rendered.args.len() + 1);
    command.push(rendered.executable.clone());
    command.extend(rendered.args.iter().cloned());
    out.push_str(&format!("command: {}\n", shell_words::join(&command)));

    if !rendered.env.is_empty() {
        out.push_str("environment:\n");
        for (key, value) in &rendered.env {
            out.push_str(&format!("  {}={}\n", key, value));
        }
    }
    if let Some(ref cwd) = rendered.cwd {
        out.push_str(&format!("working dir: {}\n", cwd.display()));
    }
    out.push_str(&format!("timeout: {}s\n", rendered.timeout_seconds));
    out.push_str(&format!("retry attempts: {}\n", rendered.retry_attempts));
    out
}

fn render_summary_text(summary: &BatchSummary) -> String {
    let mut out = format!(
        "batch '{}': {} total, {} succeeded, {} failed, {} skipped in {}ms\n",
        summary.tool_name,
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.duration_ms
    );
    if summary.interrupted {
        out.push_str("batch was interrupted before all items could run\n");
    }
    for item in &summary.items {
        let note = item
            .error
            .clone()
            .unwrap_or_else(|| item.status.to_string());
        let line = match item.status {
            ItemStatus::Succeeded => {
                let duration = item
                    .result
                    .as_ref()
                    .map(|result| result.duration_ms)
                    .unwrap_or(0);
                format!("  [{}] succeeded ({}ms)\n", item.index, duration)
            }
            ItemStatus::Pending => format!("  [{}] skipped: {}\n", item.index, note),
            _ => format!("  [{}] {}: {}\n", item.index, item.status, note),
        };
        out.push_str(&line);
    }
    out
}

fn render_settings_text(settings: &Settings) -> String {
    let mut out = format!(
        "settings: default timeout {}, max concurrent jobs {}, log level {}\n",
        humantime::format_duration(Duration::from_secs(settings.default_timeout_seconds)),
        settings.max_concurrent_jobs,
        settings.log_level
    );
    if let Some(ref endpoint) = settings.metrics_endpoint {
        out.push_str(&format!("metrics endpoint: {}\n", endpoint));
    }
    out
}

fn render_tool_info(tool: &ToolConfig, settings: &Settings) -> String {
    let mut out = format!("tool '{}'\n", tool.name);
    let resolved = match resolve_executable(&tool.executable) {
        Ok(path) => format!("resolved: {}", path.display()),
        Err(_) => "not found".to_string(),
    };
    out.push_str(&format!("  executable: {} ({})\n", tool.executable, resolved));
    if !tool.default_args.is_empty() {
        out.push_str(&format!(
            "  default args: {}\n",
            shell_words::join(&tool.default_args)
        ));
    }
    let timeout = humantime::format_duration(tool.effective_timeout(settings));
    match tool.timeout_seconds {
        Some(_) => out.push_str(&format!("  timeout: {}\n", timeout)),
        None => out.push_str(&format!("  timeout: {} (global default)\n", timeout)),
    }
    out.push_str(&format!(
        "  retries: {} (wait {}ms)\n",
        tool.retry_attempts, tool.retry_wait_ms
    ));
    if let Some(ref dir) = tool.working_dir {
        out.push_str(&format!("  working dir: {}\n", dir.display()));
    }
    if !tool.env.is_empty() {
        let pairs: Vec<String> = tool
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        out.push_str(&format!("  env: {}\n", pairs.join(" ")));
    }
    if !tool.validation.required_args.is_empty() {
        out.push_str(&format!(
            "  required args: {}\n",
            tool.validation.required_args.join(" ")
        ));
    }
    if !tool.validation.file_args.is_empty() {
        let indexes: Vec<String> = tool
            .validation
            .file_args
            .iter()
            .map(|index| index.to_string())
            .collect();
        out.push_str(&format!("  file args: {}\n", indexes.join(" ")));
    }
    out
}

fn tool_info_json(tool: &ToolConfig, settings: &Settings) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "executable": tool.executable,
        "resolved_path": resolve_executable(&tool.executable)
            .ok()
            .map(|path| path.display().to_string()),
        "default_args": tool.default_args,
        "effective_timeout_seconds": tool.effective_timeout(settings).as_secs(),
        "retry_attempts": tool.retry_attempts,
        "retry_wait_ms": tool.retry_wait_ms,
        "working_dir": tool.working_dir.as_ref().map(|dir| dir.display().to_string()),
        "env": tool.env,
        "validation": tool.validation,
    })
}
