use crate::cli::LogLevel;
use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::{Layer, filter::LevelFilter, fmt, prelude::*, registry::LookupSpan};

/// Maps the conventional log level names onto tracing levels; `CRITICAL` has no tracing
/// counterpart and shares `ERROR`.
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Notset => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
    }
}

/// Plain-text layer for `--log-file`: no colors, with thread ids and targets.
fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
}

/// Installs the global subscriber: compact colored output on stderr, plus `log_file` when
/// given. The file is created before anything is installed.
pub fn setup_logging(level: LogLevel, log_file: Option<PathBuf>) -> Result<()> {
    let file = log_file.map(File::create).transpose().map_err(CliError::Io)?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(stderr_layer)
        .with(file.map(file_layer))
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install the logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use tracing::{debug, error, info, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(LogLevel::Notset, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    fn levels_follow_the_conventional_names() {
        assert_eq!(level_filter(LogLevel::Notset), LevelFilter::TRACE);
        assert_eq!(level_filter(LogLevel::Debug), LevelFilter::DEBUG);
        assert_eq!(level_filter(LogLevel::Info), LevelFilter::INFO);
        assert_eq!(level_filter(LogLevel::Warning), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Error), LevelFilter::ERROR);
        assert_eq!(level_filter(LogLevel::Critical), LevelFilter::ERROR);
    }

    #[test]
    #[serial]
    fn global_logger_accepts_every_level() {
        ensure_global_logger_is_set();

        error!("Run failed");
        warn!(step = 1, "Step failed");
        info!(steps = 2, configurations = 3, "Workflow validated.");
        debug!(configuration = 0, step = 4, "Optimization step.");
        trace!("Schema header accepted.");
    }

    #[test]
    #[serial]
    fn file_layer_records_level_thread_target_and_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("seamm-ani.log");
        let file = File::create(&log_path).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(file));

        tracing::subscriber::with_default(subscriber, || {
            info!(target: "seamm_ani::workflows::compute", step = 0, "Step validated.");
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Step validated."));
        assert!(content.contains("INFO"));
        assert!(content.contains("ThreadId"));
        assert!(content.contains("seamm_ani::workflows::compute"));
        assert!(content.contains("step=0"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    #[serial]
    fn unwritable_log_file_is_an_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("missing").join("seamm-ani.log");
        let result = setup_logging(LogLevel::Warning, Some(path));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
