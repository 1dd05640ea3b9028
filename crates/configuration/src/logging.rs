use crate::error::ConfigError;
use crate::settings::LoggingSettings;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber: a console layer plus a daily rolling file.
///
/// `RUST_LOG` wins over `logging.level` when set. The returned guard flushes the
/// file writer on drop, so the caller must keep it alive for the process lifetime.
/// File logging is skipped (with a warning on stderr) when the directory is not writable.
pub fn init_tracing(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},sqlx=warn", settings.level)))
        .map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    let (file_layer, guard) = if directory_is_writable(&settings.directory) {
        let appender = tracing_appender::rolling::daily(&settings.directory, &settings.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        eprintln!(
            "Warning: log directory {} is not writable, file logging disabled",
            settings.directory
        );
        (None, None)
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    Ok(guard)
}

// `rolling::daily` panics if it cannot create its first file.
fn directory_is_writable(directory: &str) -> bool {
    if std::fs::create_dir_all(directory).is_err() {
        return false;
    }
    let probe = Path::new(directory).join(".evolver_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
