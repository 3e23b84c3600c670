use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking log writers flushing. Hold it until exit.
pub struct LoggingGuard {
    _file: WorkerGuard,
    _stdout: WorkerGuard,
}

pub fn init_logging(log_dir: &str, service_name: &str) -> Result<LoggingGuard, anyhow::Error> {
    std::fs::create_dir_all(log_dir)?;
    let rotated = rotate_logs_on_startup(log_dir, service_name)?;

    // One file per run; the previous one was moved aside above
    let file_appender = rolling::never(log_dir, format!("{service_name}.log"));
    let (non_blocking_file, file_guard) = non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = non_blocking(std::io::stdout());

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(non_blocking_stdout)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false);

    // RUST_LOG overrides
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    info!("Logging initialized - logs will be written to {log_dir}/{service_name}.log");
    if let Some(backup) = rotated {
        info!("Previous log file backed up to: {}", backup.display());
    }

    Ok(LoggingGuard {
        _file: file_guard,
        _stdout: stdout_guard,
    })
}

/// Renames `<service>.log` to `<service>.<timestamp>.log`, returning the new
/// path if there was anything to rotate.
pub fn rotate_logs_on_startup(log_dir: &str, service_name: &str) -> Result<Option<PathBuf>, anyhow::Error> {
    let log_path = Path::new(log_dir).join(format!("{service_name}.log"));

    if !log_path.exists() {
        return Ok(None);
    }

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let backup = Path::new(log_dir).join(format!("{service_name}.{timestamp}.log"));
    std::fs::rename(&log_path, &backup)?;

    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_without_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let rotated = rotate_logs_on_startup(dir.path().to_str().unwrap(), "browserd").unwrap();
        assert!(rotated.is_none());
    }

    #[test]
    fn test_rotate_moves_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("browserd.log");
        std::fs::write(&current, "previous run").unwrap();

        let backup = rotate_logs_on_startup(dir.path().to_str().unwrap(), "browserd")
            .unwrap()
            .unwrap();

        assert!(!current.exists());
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "previous run");
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("browserd.") && name.ends_with(".log"));
    }
}
