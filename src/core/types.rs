use serde::{Deserialize, Serialize};

/// Batch item status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Running => "running",
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
            ItemStatus::TimedOut => "timed out",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ConfigurationError,
    ValidationError,
    LaunchError,
    ExecutionError,
    TimeoutError,
    IoError,
    SerializationError,
    Interrupted,
    InternalError,
}

impl ErrorCategory {
    /// Process exit code scripting callers can branch on.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::ConfigurationError => 3,
            ErrorCategory::ValidationError => 4,
            ErrorCategory::LaunchError => 5,
            ErrorCategory::ExecutionError => 6,
            ErrorCategory::TimeoutError => 7,
            ErrorCategory::Interrupted => 130,
            ErrorCategory::IoError
            | ErrorCategory::SerializationError
            | ErrorCategory::InternalError => 1,
        }
    }

    /// Short prefix used for default machine-readable error codes.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            ErrorCategory::ConfigurationError => "CFG",
            ErrorCategory::ValidationError => "VAL",
            ErrorCategory::LaunchError => "LNC",
            ErrorCategory::ExecutionError => "EXE",
            ErrorCategory::TimeoutError => "TMO",
            ErrorCategory::IoError => "IO",
            ErrorCategory::SerializationError => "SER",
            ErrorCategory::Interrupted => "INT",
            ErrorCategory::InternalError => "ERR",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}
