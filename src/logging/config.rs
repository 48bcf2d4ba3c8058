use crate::core::config::FerruleConfig;
use crate::logging::layers::console::ConsoleOutput;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The `[logging]` table of ferrule.toml: where diagnostics are emitted.
/// The level itself lives in `[settings]` next to the other global knobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Console sink for diagnostic output.
    #[serde(default)]
    pub console: ConsoleOutput,

    /// Optional file logs are appended to as well. Relative paths resolve
    /// against the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Fallback tracing directive used when RUST_LOG is not set: --verbose
/// forces debug, otherwise the configured settings.log_level applies.
pub fn resolve_level(config: &FerruleConfig, verbose: bool) -> String {
    if verbose {
        return "debug".to_string();
    }
    config.settings.log_level.clone()
}
