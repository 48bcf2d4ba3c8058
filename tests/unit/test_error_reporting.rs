use ferrule::core::error::{AppError, ConsoleReporter, ErrorReporter};
use ferrule::core::types::{ErrorCategory, ErrorSeverity};
use std::sync::{Arc, Mutex};

/// Reporter that records everything it is handed, proving components can
/// run against any ErrorReporter implementation.
#[derive(Default)]
struct RecordingReporter {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn report_error(&self, error: &AppError) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn report_warning(&self, message: &str, _context: Option<String>) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn report_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn report_debug(&self, _message: &str) {}
}

#[test]
fn test_reporter_is_usable_as_a_trait_object() {
    let recording = Arc::new(RecordingReporter::default());
    let reporter: Arc<dyn ErrorReporter> = recording.clone();

    let error = AppError::new(ErrorCategory::ExecutionError, "tool exited with code 2");
    reporter.report_error(&error);
    reporter.report_warning("retrying in 500ms", None);
    reporter.report_info("done");

    assert_eq!(recording.errors.lock().unwrap().len(), 1);
    assert!(recording.errors.lock().unwrap()[0].contains("tool exited with code 2"));
    assert_eq!(
        recording.warnings.lock().unwrap().as_slice(),
        &["retrying in 500ms".to_string()]
    );
    assert_eq!(recording.infos.lock().unwrap().as_slice(), &["done".to_string()]);
}

#[test]
fn test_console_reporter_smoke() {
    // Output goes to stderr; these only assert that nothing panics for
    // every verbosity combination.
    for (verbose, quiet) in [(false, false), (true, false), (false, true)] {
        let reporter = ConsoleReporter::new(verbose, quiet);
        let mut error = AppError::new(ErrorCategory::ConfigurationError, "bad config");
        error.add_context("path", "/etc/ferrule/ferrule.toml");
        reporter.report_error(&error);
        reporter.report_warning("watch out", Some("extra".to_string()));
        reporter.report_info("loaded");
        reporter.report_debug("details");
    }
}

#[test]
fn test_every_category_has_a_stable_exit_code() {
    let expected = [
        (ErrorCategory::ConfigurationError, 3),
        (ErrorCategory::ValidationError, 4),
        (ErrorCategory::LaunchError, 5),
        (ErrorCategory::ExecutionError, 6),
        (ErrorCategory::TimeoutError, 7),
        (ErrorCategory::Interrupted, 130),
        (ErrorCategory::IoError, 1),
        (ErrorCategory::SerializationError, 1),
        (ErrorCategory::InternalError, 1),
    ];
    for (category, code) in expected {
        assert_eq!(category.exit_code(), code, "category {:?}", category);
        assert_eq!(AppError::new(category, "x").exit_code(), code);
    }
}

#[test]
fn test_default_codes_come_from_the_category() {
    assert_eq!(
        AppError::new(ErrorCategory::ConfigurationError, "x").code,
        "CFG"
    );
    assert_eq!(AppError::new(ErrorCategory::ValidationError, "x").code, "VAL");
    assert_eq!(AppError::new(ErrorCategory::LaunchError, "x").code, "LNC");
    assert_eq!(AppError::new(ErrorCategory::ExecutionError, "x").code, "EXE");
    assert_eq!(AppError::new(ErrorCategory::TimeoutError, "x").code, "TMO");
}

#[test]
fn test_interruption_is_a_warning_not_an_error() {
    assert_eq!(
        AppError::new(ErrorCategory::Interrupted, "ctrl-c").severity(),
        ErrorSeverity::Warning
    );
    assert_eq!(
        AppError::new(ErrorCategory::TimeoutError, "hung").severity(),
        ErrorSeverity::Error
    );
}

#[test]
fn test_display_carries_code_context_and_source() {
    let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let mut error = AppError::with_source(
        ErrorCategory::LaunchError,
        "failed to launch /opt/tool",
        Box::new(inner),
    )
    .with_code("INV-002");
    error.add_context("tool", "flasher");

    let rendered = error.to_string();
    assert!(rendered.contains("INV-002"));
    assert!(rendered.contains("LaunchError"));
    assert!(rendered.contains("failed to launch /opt/tool"));
    assert!(rendered.contains("tool"));
    assert!(rendered.contains("Caused by: denied"));
}

#[test]
fn test_anyhow_errors_downcast_to_app_errors() {
    // AppError travels through anyhow and comes back out intact, which is
    // how the binary picks its exit code.
    let original = AppError::new(ErrorCategory::TimeoutError, "tool hung").with_code("INV-004");
    let any: anyhow::Error = original.into();
    let recovered = any
        .downcast_ref::<AppError>()
        .expect("anyhow should preserve the concrete error");
    assert_eq!(recovered.category, ErrorCategory::TimeoutError);
    assert_eq!(recovered.code, "INV-004");
    assert_eq!(recovered.exit_code(), 7);
}

#[test]
fn test_foreign_errors_map_to_generic_categories() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let from_io = AppError::from(io);
    assert_eq!(from_io.category, ErrorCategory::IoError);
    assert_eq!(from_io.exit_code(), 1);

    let from_anyhow = AppError::from(anyhow::anyhow!("unclassified"));
    assert_eq!(from_anyhow.category, ErrorCategory::InternalError);
    assert!(from_anyhow.source.is_some());
}
