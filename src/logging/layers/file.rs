use crate::Result;
use anyhow::Context;
use std::fs::{create_dir_all, OpenOptions};
use std::io;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Layer type produced by the file sink builder.
pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, BoxMakeWriter>;

/// Layer stack that already wraps the provided subscriber.
pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

/// Build a tracing layer that appends to the provided file path via a
/// non-blocking writer. Without a path the layer writes to a sink, keeping
/// the subscriber type uniform.
pub fn file_layer<S>(log_file: Option<&Path>) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match log_file {
        Some(log_file) => {
            ensure_log_dir(log_file)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("failed to open log file {}", log_file.display()))?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let writer = BoxMakeWriter::new(move || non_blocking.clone());
            Ok((make_layer(writer), Some(guard)))
        }
        None => {
            let writer = BoxMakeWriter::new(io::sink);
            Ok((make_layer(writer), None))
        }
    }
}

fn make_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
}

fn ensure_log_dir(log_file: &Path) -> Result<()> {
    if let Some(directory) = log_file.parent() {
        if !directory.as_os_str().is_empty() {
            create_dir_all(directory).with_context(|| {
                format!("failed to create log directory {}", directory.display())
            })?;
        }
    }
    Ok(())
}
