pub mod batch;
pub mod config;
pub mod error;
pub mod invoker;
pub mod types;

pub use batch::{BatchItemReport, BatchJob, BatchRunner, BatchSummary};
pub use config::{ConfigLoader, FerruleConfig, LoadedConfig, Settings, ToolConfig};
pub use error::{AppError, ConsoleReporter, ErrorReporter};
pub use invoker::{ExecutionOverrides, InvocationResult, Invoker, ProcessRunner};
pub use types::*;
