#![allow(clippy::result_large_err)]

use crate::core::config::ToolConfig;
use crate::core::error::{AppError, ErrorReporter};
use crate::core::invoker::{ExecutionOverrides, InvocationResult, Invoker};
use crate::core::types::{ErrorCategory, ItemStatus};
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One batch request: every item invokes the same tool with its own
/// argument list.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub items: Vec<Vec<String>>,
    pub max_concurrent: usize,
    pub fail_fast: bool,
}

/// Per-item outcome. `index` always matches the item's position in the
/// input, regardless of completion order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemReport {
    pub index: usize,
    pub args: Vec<String>,
    pub status: ItemStatus,
    pub result: Option<InvocationResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub tool_name: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that never started because of fail-fast or an interrupt.
    pub skipped: usize,
    pub duration_ms: u64,
    pub interrupted: bool,
    pub items: Vec<BatchItemReport>,
}

impl BatchSummary {
    /// Process exit code for the whole batch. A batch whose only failures
    /// are timeouts keeps the timeout exit distinct from general failure.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return ErrorCategory::Interrupted.exit_code();
        }
        if self.failed == 0 && self.skipped == 0 {
            return 0;
        }
        let mut saw_failure = false;
        let mut all_timeouts = true;
        for item in &self.items {
            match item.status {
                ItemStatus::TimedOut => saw_failure = true,
                ItemStatus::Failed => {
                    saw_failure = true;
                    all_timeouts = false;
                }
                _ => {}
            }
        }
        if saw_failure && all_timeouts {
            ErrorCategory::TimeoutError.exit_code()
        } else {
            ErrorCategory::ExecutionError.exit_code()
        }
    }
}

/// Parse batch file content into argument lists. Blank lines and `#`
/// comments are skipped. A line starting with `[` is a JSON string array;
/// anything else is split with shell quoting rules.
pub fn parse_batch_lines(content: &str) -> Result<Vec<Vec<String>>, AppError> {
    let mut items = Vec::new();
    for (line_index, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let args = if line.starts_with('[') {
            serde_json::from_str::<Vec<String>>(line).map_err(|err| {
                batch_line_error(line_index + 1, &format!("invalid JSON array: {err}"))
            })?
        } else {
            shell_words::split(line).map_err(|err| {
                batch_line_error(line_index + 1, &format!("invalid quoting: {err}"))
            })?
        };
        items.push(args);
    }
    Ok(items)
}

pub fn parse_batch_file(path: &Path) -> Result<Vec<Vec<String>>, AppError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        let mut error = AppError::new(
            ErrorCategory::ConfigurationError,
            format!("failed to read batch file {}: {}", path.display(), err),
        )
        .with_code("BAT-002");
        error.add_context("path", &path.display().to_string());
        error
    })?;
    parse_batch_lines(&content)
}

fn batch_line_error(line_number: usize, detail: &str) -> AppError {
    let mut error = AppError::new(
        ErrorCategory::ConfigurationError,
        format!("batch file line {}: {}", line_number, detail),
    )
    .with_code("BAT-003");
    error.add_context("line", &line_number.to_string());
    error
}

/// Runs a batch of invocations of one tool with bounded concurrency.
///
/// Items acquire slots in submission order. On fail-fast, items that have
/// not started yet stay pending while in-flight ones run to completion and
/// are recorded. Cancellation kills in-flight children and reports the
/// partial results gathered so far.
pub struct BatchRunner {
    invoker: Arc<Invoker>,
    reporter: Arc<dyn ErrorReporter>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        invoker: Arc<Invoker>,
        reporter: Arc<dyn ErrorReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            reporter,
            cancel,
        }
    }

    pub async fn run(&self, tool: &ToolConfig, job: BatchJob) -> Result<BatchSummary, AppError> {
        if job.items.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "batch contains no invocations",
            )
            .with_code("BAT-001"));
        }

        let total = job.items.len();
        let max_concurrent = job.max_concurrent.max(1);
        tracing::info!(
            tool = %tool.name,
            total,
            max_concurrent,
            fail_fast = job.fail_fast,
            "starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let failure_seen = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let mut handles = Vec::with_capacity(total);
        for (index, args) in job.items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let failure_seen = Arc::clone(&failure_seen);
            let invoker = Arc::clone(&self.invoker);
            let reporter = Arc::clone(&self.reporter);
            let cancel = self.cancel.clone();
            let tool = tool.clone();
            let fail_fast = job.fail_fast;

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return unstarted_item(index, args, "not started (runner shut down)"),
                    },
                    _ = cancel.cancelled() => {
                        return unstarted_item(index, args, "not started (interrupted)");
                    }
                };
                // Re-check after acquiring the slot: a failure or interrupt
                // that landed while this item was queued must keep it from
                // starting.
                if cancel.is_cancelled() {
                    drop(permit);
                    return unstarted_item(index, args, "not started (interrupted)");
                }
                if fail_fast && failure_seen.load(Ordering::SeqCst) {
                    drop(permit);
                    return unstarted_item(index, args, "not started (fail-fast)");
                }

                let overrides = ExecutionOverrides::default();
                let outcome = tokio::select! {
                    result = invoker.execute(&tool, &args, &overrides) => result,
                    _ = cancel.cancelled() => {
                        // Dropping the execute future kills the child.
                        failure_seen.store(true, Ordering::SeqCst);
                        tracing::warn!(index, "batch item interrupted while running");
                        return BatchItemReport {
                            index,
                            args,
                            status: ItemStatus::Failed,
                            result: None,
                            error: Some("interrupted while running".to_string()),
                        };
                    }
                };

                // A failure must be recorded before the slot frees, or the
                // next queued item could start past the fail-fast check.
                let report = match outcome {
                    Ok(result) if result.success => {
                        tracing::debug!(index, duration_ms = result.duration_ms, "batch item succeeded");
                        BatchItemReport {
                            index,
                            args,
                            status: ItemStatus::Succeeded,
                            result: Some(result),
                            error: None,
                        }
                    }
                    Ok(result) => {
                        failure_seen.store(true, Ordering::SeqCst);
                        let status = if result.timed_out {
                            ItemStatus::TimedOut
                        } else {
                            ItemStatus::Failed
                        };
                        let error = result
                            .error_for_status()
                            .err()
                            .map(|err| err.message.clone());
                        if let Some(ref message) = error {
                            reporter.report_warning(
                                &format!("batch item {} failed: {}", index, message),
                                None,
                            );
                        }
                        BatchItemReport {
                            index,
                            args,
                            status,
                            result: Some(result),
                            error,
                        }
                    }
                    Err(err) => {
                        failure_seen.store(true, Ordering::SeqCst);
                        reporter.report_error(&err);
                        BatchItemReport {
                            index,
                            args,
                            status: ItemStatus::Failed,
                            result: None,
                            error: Some(err.to_string()),
                        }
                    }
                };
                drop(permit);
                report
            }));
        }

        // join_all preserves submission order, so reports line up with the
        // input without any reordering step.
        let mut items = Vec::with_capacity(total);
        for (slot, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(report) => items.push(report),
                Err(join_err) => items.push(BatchItemReport {
                    index: slot,
                    args: Vec::new(),
                    status: ItemStatus::Failed,
                    result: None,
                    error: Some(format!("batch task panicked: {join_err}")),
                }),
            }
        }

        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for item in &items {
            match item.status {
                ItemStatus::Succeeded => succeeded += 1,
                ItemStatus::Pending => skipped += 1,
                _ => failed += 1,
            }
        }

        let summary = BatchSummary {
            tool_name: tool.name.clone(),
            total,
            succeeded,
            failed,
            skipped,
            duration_ms: started.elapsed().as_millis() as u64,
            interrupted: self.cancel.is_cancelled(),
            items,
        };
        tracing::info!(
            tool = %tool.name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            interrupted = summary.interrupted,
            "batch finished"
        );
        Ok(summary)
    }
}

fn unstarted_item(index: usize, args: Vec<String>, note: &str) -> BatchItemReport {
    BatchItemReport {
        index,
        args,
        status: ItemStatus::Pending,
        result: None,
        error: Some(note.to_string()),
    }
}
