use clap::Parser;
use ferrule::cli::{self, Args};
use ferrule::core::config::ConfigLoader;
use ferrule::core::error::AppError;
use ferrule::core::types::ErrorCategory;
use ferrule::logging;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

// Errors map to exit codes here, after the logging guard has flushed.
async fn run() -> ExitCode {
    let args = Args::parse();

    let loaded = match ConfigLoader::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{}", err);
            return to_exit_code(err.exit_code());
        }
    };

    let _logging_guard = match logging::init(&loaded.config, args.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {:#}", err);
            return to_exit_code(ErrorCategory::ConfigurationError.exit_code());
        }
    };

    tracing::debug!(
        config = %loaded
            .path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string()),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; shutting down");
            signal_cancel.cancel();
        }
    });

    match cli::run(args, loaded, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<AppError>() {
            Some(app_error) => {
                eprintln!("{}", app_error);
                to_exit_code(app_error.exit_code())
            }
            None => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}
