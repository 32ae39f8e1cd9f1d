use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const MAX_LOG_FILES: usize = 31;
const DEFAULT_LOG_FILE: &str = "prediction-consumer.log";

/// Our crates at debug, everything else at info, noisy transports quieter.
const DEFAULT_FILTER: &str = "prediction_consumer=debug,prediction_consumer_core=debug,info,\
rdkafka=warn,reqwest=error,hyper=error,hyper_util=error,tungstenite=error,\
tokio_tungstenite=error,rustls=error,h2=error";

/// Install the global subscriber. Logs go to stderr, and also to a daily
/// rolling file when `log_path` is set. Keep the guard alive for the life of
/// the process so buffered file output is flushed.
pub fn init(log_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file, guard) = match log_path {
        Some(path) => {
            let (dir, prefix) = split_log_path(path);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(prefix)
                .max_log_files(MAX_LOG_FILES)
                .build(&dir)
                .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_level(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
    (dir, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path(Path::new("/var/log/consumer/app.log")),
            (PathBuf::from("/var/log/consumer"), "app.log".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("app.log")),
            (PathBuf::from("."), "app.log".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("/")),
            (PathBuf::from("."), DEFAULT_LOG_FILE.to_string())
        );
    }

    #[test]
    fn test_default_filter_parses() {
        EnvFilter::try_new(DEFAULT_FILTER).unwrap();
    }
}
