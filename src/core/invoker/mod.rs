#![allow(clippy::result_large_err)] // AppError carries the diagnostics callers print; boxing would discard them.

use crate::core::config::{Settings, ToolConfig};
use crate::core::error::{AppError, ErrorReporter};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;

const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 1_048_576;

/// Everything needed to start one child process attempt.
#[derive(Clone, Debug)]
pub struct ProcessRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Overlay applied over the inherited environment.
    pub env: IndexMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ProcessOutput {
    /// None when the process was killed before exiting on its own.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, AppError>;
}

/// Production runner backed by tokio's process support.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, AppError> {
        let mut command = Command::new(&request.program);
        command.args(&request.args);
        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(ref cwd) = request.cwd {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|err| {
            AppError::new(
                ErrorCategory::LaunchError,
                format!("failed to launch {}: {}", request.program.display(), err),
            )
            .with_code("INV-002")
        })?;

        match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(|err| {
                    AppError::new(
                        ErrorCategory::ExecutionError,
                        format!(
                            "failed to collect output from {}: {}",
                            request.program.display(),
                            err
                        ),
                    )
                    .with_code("INV-003")
                })?;
                Ok(ProcessOutput {
                    exit_code: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    timed_out: false,
                })
            }
            // kill_on_drop reaps the child when the timed-out wait future is dropped.
            Err(_) => Ok(ProcessOutput {
                exit_code: None,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: true,
            }),
        }
    }
}

/// Outcome of one logical invocation, including any retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub tool_name: String,
    pub command: Vec<String>,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub attempts: u32,
}

impl InvocationResult {
    /// Convert a failed result into its error category. Timeouts and
    /// non-zero exits map to distinct categories so scripting callers can
    /// tell "tool rejected input" from "tool hung".
    pub fn error_for_status(&self) -> Result<(), AppError> {
        if self.success {
            return Ok(());
        }
        if self.timed_out {
            let mut error = AppError::new(
                ErrorCategory::TimeoutError,
                format!(
                    "tool '{}' did not finish within the timeout after {} attempt(s)",
                    self.tool_name, self.attempts
                ),
            )
            .with_code("INV-004");
            error.add_context("attempts", &self.attempts.to_string());
            return Err(error);
        }
        let mut error = AppError::new(
            ErrorCategory::ExecutionError,
            format!(
                "tool '{}' exited with code {} after {} attempt(s)",
                self.tool_name,
                describe_exit(self.exit_code),
                self.attempts
            ),
        )
        .with_code("INV-005");
        error.add_context("attempts", &self.attempts.to_string());
        error.add_context("stderr", truncate_for_context(&self.stderr));
        Err(error)
    }
}

/// Caller-supplied per-invocation overrides layered onto the tool config.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOverrides {
    pub env: IndexMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Fully resolved invocation preview for dry runs.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedInvocation {
    pub tool_name: String,
    pub executable: String,
    pub resolved_path: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

/// Validates, executes, and reports invocations of configured tools.
pub struct Invoker {
    settings: Settings,
    runner: Arc<dyn ProcessRunner>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Invoker {
    pub fn new(settings: Settings, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self::with_runner(settings, Arc::new(TokioProcessRunner), reporter)
    }

    pub fn with_runner(
        settings: Settings,
        runner: Arc<dyn ProcessRunner>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            settings,
            runner,
            reporter,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check every configured rule against the merged argument list,
    /// collecting all violations rather than stopping at the first.
    pub fn validate(&self, tool: &ToolConfig, args: &[String]) -> Result<(), AppError> {
        let merged = merge_args(tool, args);
        let mut violations = Vec::new();

        for required in &tool.validation.required_args {
            if !merged.iter().any(|arg| arg == required) {
                violations.push(format!("required argument '{}' is missing", required));
            }
        }

        for &index in &tool.validation.file_args {
            match merged.get(index) {
                Some(candidate) if Path::new(candidate).is_file() => {}
                Some(candidate) => violations.push(format!(
                    "argument {} ('{}') does not name an existing file",
                    index, candidate
                )),
                None => violations.push(format!(
                    "argument {} must name an existing file, but only {} arguments were supplied",
                    index,
                    merged.len()
                )),
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        let mut error = AppError::new(
            ErrorCategory::ValidationError,
            format!(
                "argument validation failed for '{}': {}",
                tool.name,
                violations.join("; ")
            ),
        )
        .with_code("INV-001");
        error.add_context("violation_count", &violations.len().to_string());
        Err(error)
    }

    /// Merge arguments and environment, then run the tool with timeout and
    /// retry handling. A completed invocation comes back as Ok even when the
    /// tool failed; the result records success, exit code, and attempts.
    /// Validation and launch problems surface as errors without any retry.
    pub async fn execute(
        &self,
        tool: &ToolConfig,
        args: &[String],
        overrides: &ExecutionOverrides,
    ) -> Result<InvocationResult, AppError> {
        self.validate(tool, args)?;
        let request = self.build_request(tool, args, overrides)?;
        let max_attempts = tool.retry_attempts.saturating_add(1);

        let mut attempt = 1u32;
        loop {
            tracing::debug!(
                tool = %tool.name,
                program = %request.program.display(),
                attempt,
                max_attempts,
                timeout_secs = request.timeout.as_secs(),
                "launching tool process"
            );
            let start = Instant::now();
            let output = self.runner.run(&request).await?;
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = InvocationResult {
                tool_name: tool.name.clone(),
                command: render_command(&request),
                success: output.exit_code == Some(0) && !output.timed_out,
                exit_code: output.exit_code,
                stdout: limit_bytes(&output.stdout),
                stderr: limit_bytes(&output.stderr),
                duration_ms,
                timed_out: output.timed_out,
                attempts: attempt,
            };

            if result.success || attempt >= max_attempts {
                return Ok(result);
            }

            let reason = if result.timed_out {
                "timed out".to_string()
            } else {
                format!("exited with code {}", describe_exit(result.exit_code))
            };
            self.reporter.report_warning(
                &format!(
                    "tool '{}' {} on attempt {}/{}; retrying in {}ms",
                    tool.name, reason, attempt, max_attempts, tool.retry_wait_ms
                ),
                None,
            );
            tokio::time::sleep(tool.retry_wait()).await;
            attempt += 1;
        }
    }

    /// Resolve the full invocation without launching anything.
    pub fn render(
        &self,
        tool: &ToolConfig,
        args: &[String],
        overrides: &ExecutionOverrides,
    ) -> RenderedInvocation {
        let merged_args = merge_args(tool, args);
        let env = merge_env(tool, &overrides.env);
        let cwd = overrides.cwd.clone().or_else(|| tool.working_dir.clone());
        let timeout = overrides
            .timeout
            .unwrap_or_else(|| tool.effective_timeout(&self.settings));

        RenderedInvocation {
            tool_name: tool.name.clone(),
            executable: tool.executable.clone(),
            resolved_path: resolve_executable(&tool.executable).ok(),
            args: merged_args,
            env,
            cwd,
            timeout_seconds: timeout.as_secs(),
            retry_attempts: tool.retry_attempts,
        }
    }

    fn build_request(
        &self,
        tool: &ToolConfig,
        args: &[String],
        overrides: &ExecutionOverrides,
    ) -> Result<ProcessRequest, AppError> {
        let program = resolve_executable(&tool.executable)?;
        let merged_args = merge_args(tool, args);
        let env = merge_env(tool, &overrides.env);
        let cwd = overrides.cwd.clone().or_else(|| tool.working_dir.clone());
        let timeout = overrides
            .timeout
            .unwrap_or_else(|| tool.effective_timeout(&self.settings));

        Ok(ProcessRequest {
            program,
            args: merged_args,
            env,
            cwd,
            timeout,
        })
    }
}

/// Default arguments precede caller arguments; nothing is deduplicated.
pub fn merge_args(tool: &ToolConfig, args: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(tool.default_args.len() + args.len());
    merged.extend(tool.default_args.iter().cloned());
    merged.extend(args.iter().cloned());
    merged
}

/// Build the environment overlay applied over the inherited environment.
/// Caller overrides go in first; config values win on key collision.
pub fn merge_env(tool: &ToolConfig, caller: &IndexMap<String, String>) -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    for (key, value) in caller {
        env.insert(key.clone(), value.clone());
    }
    for (key, value) in &tool.env {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Resolve a configured executable to an on-disk path. Bare names are
/// searched through PATH; anything with a path separator must exist as given.
pub fn resolve_executable(executable: &str) -> Result<PathBuf, AppError> {
    if executable.trim().is_empty() {
        return Err(AppError::new(
            ErrorCategory::ConfigurationError,
            "tool executable is empty",
        )
        .with_code("CFG-005"));
    }

    let candidate = Path::new(executable);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(launch_missing(executable));
    }

    if let Some(path_var) = env::var_os("PATH") {
        for dir in env::split_paths(&path_var) {
            let full = dir.join(executable);
            if full.is_file() {
                return Ok(full);
            }
        }
    }

    Err(launch_missing(executable))
}

fn launch_missing(executable: &str) -> AppError {
    AppError::new(
        ErrorCategory::LaunchError,
        format!("executable '{}' not found", executable),
    )
    .with_code("INV-006")
}

fn render_command(request: &ProcessRequest) -> Vec<String> {
    let mut command = Vec::with_capacity(request.args.len() + 1);
    command.push(request.program.display().to_string());
    command.extend(request.args.iter().cloned());
    command
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (killed)".to_string(),
    }
}

fn limit_bytes(bytes: &[u8]) -> String {
    if bytes.len() <= OUTPUT_CAPTURE_LIMIT_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..OUTPUT_CAPTURE_LIMIT_BYTES]).into_owned();
    text.push_str("\n[output truncated]");
    text
}

fn truncate_for_context(text: &str) -> &str {
    let mut end = text.len().min(4096);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
