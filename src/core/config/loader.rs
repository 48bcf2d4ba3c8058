#![allow(clippy::result_large_err)]

use super::FerruleConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;
use url::Url;

/// A loaded configuration plus where it came from. `path` is None when no
/// config file was found and built-in defaults are in effect.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: FerruleConfig,
    pub path: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from an explicit path, or walk the search locations.
    /// Environment variables override config file values.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, AppError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?.ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("config file {} not found", path.display()),
                )
                .with_code("CFG-001")
            })?;
            return Ok(LoadedConfig {
                config: Self::finish(config),
                path: Some(path.to_path_buf()),
            });
        }

        for candidate in Self::search_paths() {
            if let Some(config) = Self::load_from_file(&candidate)? {
                return Ok(LoadedConfig {
                    config: Self::finish(config),
                    path: Some(candidate),
                });
            }
        }

        Ok(LoadedConfig {
            config: Self::finish(FerruleConfig::default()),
            path: None,
        })
    }

    /// Locations probed in order when no --config path is given.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("ferrule.toml")];
        if let Some(base) = dirs_next::config_dir() {
            paths.push(base.join("ferrule").join("ferrule.toml"));
        }
        paths.push(PathBuf::from("/etc/ferrule/ferrule.toml"));
        paths
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<FerruleConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: FerruleConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-002")
        })?;

        Ok(Some(config))
    }

    fn finish(mut config: FerruleConfig) -> FerruleConfig {
        Self::apply_env_overrides(&mut config);
        config.assign_tool_names();
        config
    }

    /// Apply environment variable overrides to the configuration.
    /// Invalid values are ignored and the file value stays in effect.
    fn apply_env_overrides(config: &mut FerruleConfig) {
        if let Ok(timeout_str) = env::var("FERRULE_DEFAULT_TIMEOUT") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                if timeout > 0 {
                    config.settings.default_timeout_seconds = timeout;
                }
            }
        }

        if let Ok(jobs_str) = env::var("FERRULE_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = jobs_str.parse::<usize>() {
                if jobs > 0 {
                    config.settings.max_concurrent_jobs = jobs;
                }
            }
        }

        if let Ok(level) = env::var("FERRULE_LOG_LEVEL") {
            if Directive::from_str(&level).is_ok() {
                config.settings.log_level = level;
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "FERRULE_DEFAULT_TIMEOUT - Override settings.default_timeout_seconds (positive integer)",
            "FERRULE_MAX_CONCURRENT_JOBS - Override settings.max_concurrent_jobs (positive integer)",
            "FERRULE_LOG_LEVEL - Override settings.log_level (tracing directive, e.g. debug)",
            "RUST_LOG - Full tracing filter; takes precedence over settings.log_level",
        ]
    }

    /// Collect every semantic problem in the configuration so the caller
    /// gets a complete diagnostic in one pass.
    pub fn config_issues(config: &FerruleConfig) -> Vec<String> {
        let mut issues = Vec::new();

        if config.settings.default_timeout_seconds == 0 {
            issues.push("settings.default_timeout_seconds must be positive".to_string());
        }
        if config.settings.max_concurrent_jobs == 0 {
            issues.push("settings.max_concurrent_jobs must be at least 1".to_string());
        }
        if Directive::from_str(&config.settings.log_level).is_err() {
            issues.push(format!(
                "settings.log_level '{}' is not a valid tracing directive",
                config.settings.log_level
            ));
        }
        if let Some(endpoint) = &config.settings.metrics_endpoint {
            if let Err(err) = Url::parse(endpoint) {
                issues.push(format!(
                    "settings.metrics_endpoint '{}' is not a valid URL: {}",
                    endpoint, err
                ));
            }
        }

        for (name, tool) in &config.tools {
            if tool.executable.trim().is_empty() {
                issues.push(format!("tools.{}.executable must not be empty", name));
            }
            if tool.timeout_seconds == Some(0) {
                issues.push(format!("tools.{}.timeout_seconds must be positive", name));
            }
        }

        issues
    }

    /// Validate configuration values
    pub fn validate_config(config: &FerruleConfig) -> Result<(), AppError> {
        let issues = Self::config_issues(config);
        if issues.is_empty() {
            return Ok(());
        }
        let mut error = AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid configuration: {}", issues.join("; ")),
        )
        .with_code("CFG-003");
        error.add_context("issue_count", &issues.len().to_string());
        Err(error)
    }
}
