use async_trait::async_trait;
use ferrule::core::config::{Settings, ToolConfig, ValidationRules};
use ferrule::core::error::{AppError, ConsoleReporter, ErrorReporter};
use ferrule::core::invoker::{
    ExecutionOverrides, Invoker, ProcessOutput, ProcessRequest, ProcessRunner,
};
use ferrule::core::types::ErrorCategory;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Runner that records every request and replays a scripted sequence of
/// outcomes, so retry behavior can be observed without real processes.
struct MockRunner {
    requests: Mutex<Vec<ProcessRequest>>,
    script: Mutex<VecDeque<Result<ProcessOutput, AppError>>>,
}

impl MockRunner {
    fn new(script: Vec<Result<ProcessOutput, AppError>>) -> Arc<Self> {
        Arc::new(MockRunner {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        })
    }

    fn recorded(&self) -> Vec<ProcessRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock script exhausted")
    }
}

fn exit_with(code: i32) -> Result<ProcessOutput, AppError> {
    Ok(ProcessOutput {
        exit_code: Some(code),
        stdout: b"out".to_vec(),
        stderr: b"err".to_vec(),
        timed_out: false,
    })
}

fn timed_out() -> Result<ProcessOutput, AppError> {
    Ok(ProcessOutput {
        exit_code: None,
        stdout: Vec::new(),
        stderr: Vec::new(),
        timed_out: true,
    })
}

fn quiet_reporter() -> Arc<dyn ErrorReporter> {
    Arc::new(ConsoleReporter::new(false, true))
}

/// Tool whose executable is a real file, so resolution succeeds without
/// anything ever being spawned.
fn tool_backed_by(file: &NamedTempFile) -> ToolConfig {
    ToolConfig {
        name: "mock-tool".to_string(),
        executable: file.path().display().to_string(),
        retry_wait_ms: 1,
        ..Default::default()
    }
}

fn invoker_with(runner: Arc<MockRunner>) -> Invoker {
    Invoker::with_runner(Settings::default(), runner, quiet_reporter())
}

#[tokio::test]
async fn test_retry_attempts_means_additional_attempts() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![exit_with(1), exit_with(1), exit_with(1)]);
    let invoker = invoker_with(runner.clone());
    let mut tool = tool_backed_by(&exe);
    tool.retry_attempts = 2;

    let result = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap();

    // retry_attempts = 2 means three attempts in total.
    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(runner.recorded().len(), 3);
}

#[tokio::test]
async fn test_retrying_stops_at_first_success() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![exit_with(1), exit_with(0)]);
    let invoker = invoker_with(runner.clone());
    let mut tool = tool_backed_by(&exe);
    tool.retry_attempts = 3;

    let result = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.attempts, 2);
    assert_eq!(runner.recorded().len(), 2);
}

#[tokio::test]
async fn test_launch_failures_are_never_retried() {
    let exe = NamedTempFile::new().unwrap();
    let launch_error = AppError::new(ErrorCategory::LaunchError, "no such executable");
    let runner = MockRunner::new(vec![Err(launch_error)]);
    let invoker = invoker_with(runner.clone());
    let mut tool = tool_backed_by(&exe);
    tool.retry_attempts = 5;

    let error = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(error.category, ErrorCategory::LaunchError);
    assert_eq!(runner.recorded().len(), 1);
}

#[tokio::test]
async fn test_timeout_is_reported_as_its_own_category() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![timed_out()]);
    let invoker = invoker_with(runner);
    let tool = tool_backed_by(&exe);

    let result = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);

    let error = result.error_for_status().unwrap_err();
    assert_eq!(error.category, ErrorCategory::TimeoutError);
    assert_eq!(error.exit_code(), 7);
}

#[tokio::test]
async fn test_timeouts_are_retried_like_other_failures() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![timed_out(), exit_with(0)]);
    let invoker = invoker_with(runner.clone());
    let mut tool = tool_backed_by(&exe);
    tool.retry_attempts = 1;

    let result = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(runner.recorded().len(), 2);
}

#[tokio::test]
async fn test_request_carries_merged_args_env_and_overrides() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![exit_with(0)]);
    let invoker = invoker_with(runner.clone());

    let mut tool = tool_backed_by(&exe);
    tool.default_args = vec!["--mode".to_string(), "fast".to_string()];
    tool.env = IndexMap::from([
        ("TOOL_HOME".to_string(), "/opt/tool".to_string()),
        ("SHARED".to_string(), "config".to_string()),
    ]);

    let cwd = tempfile::tempdir().unwrap();
    let overrides = ExecutionOverrides {
        env: IndexMap::from([
            ("SHARED".to_string(), "caller".to_string()),
            ("EXTRA".to_string(), "1".to_string()),
        ]),
        cwd: Some(cwd.path().to_path_buf()),
        timeout: Some(Duration::from_secs(5)),
    };

    invoker
        .execute(&tool, &["input.txt".to_string()], &overrides)
        .await
        .unwrap();

    let requests = runner.recorded();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(request.args, vec!["--mode", "fast", "input.txt"]);
    // Config env wins the collision; caller-only keys survive.
    assert_eq!(request.env.get("SHARED"), Some(&"config".to_string()));
    assert_eq!(request.env.get("EXTRA"), Some(&"1".to_string()));
    assert_eq!(request.env.get("TOOL_HOME"), Some(&"/opt/tool".to_string()));
    assert_eq!(request.cwd.as_deref(), Some(cwd.path()));
    assert_eq!(request.timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_tool_timeout_beats_global_default() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![exit_with(0), exit_with(0)]);
    let invoker = invoker_with(runner.clone());

    let mut with_own_timeout = tool_backed_by(&exe);
    with_own_timeout.timeout_seconds = Some(30);
    let without_timeout = tool_backed_by(&exe);

    invoker
        .execute(&with_own_timeout, &[], &ExecutionOverrides::default())
        .await
        .unwrap();
    invoker
        .execute(&without_timeout, &[], &ExecutionOverrides::default())
        .await
        .unwrap();

    let requests = runner.recorded();
    assert_eq!(requests[0].timeout, Duration::from_secs(30));
    // Settings::default() carries the 600 second global fallback.
    assert_eq!(requests[1].timeout, Duration::from_secs(600));
}

#[tokio::test]
async fn test_validation_failure_prevents_any_launch() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![]);
    let invoker = invoker_with(runner.clone());

    let mut tool = tool_backed_by(&exe);
    tool.validation = ValidationRules {
        required_args: vec!["--image".to_string()],
        file_args: vec![],
    };

    let error = invoker
        .execute(&tool, &[], &ExecutionOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(error.category, ErrorCategory::ValidationError);
    assert!(error.message.contains("--image"));
    assert!(runner.recorded().is_empty());
}

#[tokio::test]
async fn test_result_records_command_and_output() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![exit_with(2)]);
    let invoker = invoker_with(runner);
    let mut tool = tool_backed_by(&exe);
    tool.default_args = vec!["--check".to_string()];

    let result = invoker
        .execute(&tool, &["a b".to_string()], &ExecutionOverrides::default())
        .await
        .unwrap();

    assert_eq!(result.tool_name, "mock-tool");
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.stdout, "out");
    assert_eq!(result.stderr, "err");
    // The recorded command starts with the resolved program path and keeps
    // arguments as separate words.
    assert_eq!(result.command[0], exe.path().display().to_string());
    assert!(result.command.contains(&"a b".to_string()));

    let error = result.error_for_status().unwrap_err();
    assert_eq!(error.category, ErrorCategory::ExecutionError);
    assert_eq!(error.exit_code(), 6);
    assert_eq!(error.context.get("stderr"), Some(&"err".to_string()));
}

#[tokio::test]
async fn test_render_previews_without_launching() {
    let exe = NamedTempFile::new().unwrap();
    let runner = MockRunner::new(vec![]);
    let invoker = invoker_with(runner.clone());

    let mut tool = tool_backed_by(&exe);
    tool.default_args = vec!["--mode".to_string(), "fast".to_string()];
    tool.timeout_seconds = Some(90);

    let rendered = invoker.render(
        &tool,
        &["job.bin".to_string()],
        &ExecutionOverrides::default(),
    );

    assert_eq!(rendered.tool_name, "mock-tool");
    assert_eq!(rendered.args, vec!["--mode", "fast", "job.bin"]);
    assert_eq!(rendered.timeout_seconds, 90);
    assert_eq!(rendered.resolved_path.as_deref(), Some(exe.path()));
    assert!(runner.recorded().is_empty());
}

#[tokio::test]
async fn test_render_tolerates_a_missing_executable() {
    let runner = MockRunner::new(vec![]);
    let invoker = invoker_with(runner);

    let tool = ToolConfig {
        name: "ghost".to_string(),
        executable: "/nonexistent/path/ghost".to_string(),
        ..Default::default()
    };

    let rendered = invoker.render(&tool, &[], &ExecutionOverrides::default());
    assert_eq!(rendered.resolved_path, None);
    assert_eq!(rendered.executable, "/nonexistent/path/ghost");
}
