use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::logging::config::LoggingSection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main ferrule configuration loaded from ferrule.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FerruleConfig {
    /// Global settings applied when a tool table omits its own value
    #[serde(default)]
    pub settings: Settings,

    /// Log sink configuration
    #[serde(default)]
    pub logging: LoggingSection,

    /// Tool table keyed by tool name, declaration order preserved
    #[serde(default)]
    pub tools: IndexMap<String, ToolConfig>,
}

impl FerruleConfig {
    /// Copy each table key into its tool record's name field.
    pub fn assign_tool_names(&mut self) {
        for (name, tool) in self.tools.iter_mut() {
            tool.name = name.clone();
        }
    }

    /// Look up a tool by name. An unknown name is a configuration error,
    /// reported with the list of known tools so the caller can correct it.
    pub fn tool(&self, name: &str) -> Result<&ToolConfig, AppError> {
        self.tools.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.tools.keys().map(String::as_str).collect();
            let mut error = AppError::new(
                ErrorCategory::ConfigurationError,
                if known.is_empty() {
                    format!("unknown tool '{}': no tools are configured", name)
                } else {
                    format!(
                        "unknown tool '{}': configured tools are {}",
                        name,
                        known.join(", ")
                    )
                },
            )
            .with_code("CFG-004");
            error.add_context("tool", name);
            error
        })
    }
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Timeout applied to tools that do not set timeout_seconds
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,

    /// Upper bound on concurrently running batch items
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Log level unless RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional metrics endpoint, validated as a URL and surfaced by info/config show
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_endpoint: Option<String>,
}

/// One external executable and how to invoke it safely
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Unique key, filled from the table key after load
    #[serde(skip)]
    pub name: String,

    /// Executable path, or a bare name resolved through PATH
    pub executable: String,

    /// Arguments always passed before caller-supplied arguments
    #[serde(default)]
    pub default_args: Vec<String>,

    /// Per-tool timeout; falls back to settings.default_timeout_seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Additional attempts after a non-zero exit or timeout
    #[serde(default)]
    pub retry_attempts: u32,

    /// Wait between retry attempts
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,

    /// Working directory for the child process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Environment variables; win over the inherited environment on collision
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Argument validation rules checked before launch
    #[serde(default)]
    pub validation: ValidationRules,
}

impl ToolConfig {
    /// Timeout for one invocation attempt, after global fallback.
    pub fn effective_timeout(&self, settings: &Settings) -> Duration {
        Duration::from_secs(
            self.timeout_seconds
                .unwrap_or(settings.default_timeout_seconds),
        )
    }

    /// Wait applied between retry attempts.
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            name: String::new(),
            executable: String::new(),
            default_args: Vec::new(),
            timeout_seconds: None,
            retry_attempts: 0,
            retry_wait_ms: default_retry_wait_ms(),
            working_dir: None,
            env: IndexMap::new(),
            validation: ValidationRules::default(),
        }
    }
}

/// Argument validation rules
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ValidationRules {
    /// Every listed token must appear in the merged argument list
    #[serde(default)]
    pub required_args: Vec<String>,

    /// Each listed index into the merged argument list must name an existing file
    #[serde(default)]
    pub file_args: Vec<usize>,
}

impl ValidationRules {
    pub fn is_empty(&self) -> bool {
        self.required_args.is_empty() && self.file_args.is_empty()
    }
}

// Default functions
fn default_timeout_seconds() -> u64 {
    600
}

fn default_max_concurrent_jobs() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retry_wait_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_timeout_seconds: default_timeout_seconds(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            log_level: default_log_level(),
            metrics_endpoint: None,
        }
    }
}

/// Commented example printed by `ferrule config example`.
pub const EXAMPLE_CONFIG: &str = r#"# ferrule.toml - tool invocation configuration
#
# Global settings apply wherever a tool table omits its own value.

[settings]
# Timeout for tools that do not set timeout_seconds.
default_timeout_seconds = 600
# Upper bound on concurrently running batch items.
max_concurrent_jobs = 10
# Log level unless RUST_LOG overrides it: trace, debug, info, warn, error.
log_level = "info"
# Optional metrics endpoint; validated and displayed, not exported to.
# metrics_endpoint = "https://metrics.example.net/ingest"

[logging]
# Where diagnostic logs go: stdout, stderr, or none.
console = "stderr"
# Uncomment to also append logs to a file.
# file = "ferrule.log"

# One table per wrapped tool.
[tools.echo_tool]
executable = "/usr/bin/echo"
default_args = ["--verbose"]
timeout_seconds = 5
retry_attempts = 0

[tools.flasher]
executable = "flash_image"
default_args = ["--mode", "careful"]
timeout_seconds = 120
retry_attempts = 2
retry_wait_ms = 1000
working_dir = "/var/lib/firmware"

[tools.flasher.env]
FLASH_SAFETY = "on"

[tools.flasher.validation]
# Every listed token must appear in the merged argument list.
required_args = ["--image"]
# Each listed index into the merged argument list must name an existing file.
file_args = [3]
"#;


pub mod loader;

pub use loader::{ConfigLoader, LoadedConfig};
