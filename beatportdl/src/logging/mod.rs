//! Console logging with local timestamps and an optional error log file.

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use indicatif::MultiProgress;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str =
    "beatportdl=info,catalog=info,transfer_engine=info,process_utils=info";

const CRATES: [&str; 4] = ["beatportdl", "catalog", "transfer_engine", "process_utils"];

pub const ERROR_LOG_FILENAME: &str = "error.log";

/// Formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Writes to stderr with the progress bars hidden, so lines are not torn.
#[derive(Clone)]
struct SuspendingStderr(MultiProgress);

impl Write for SuspendingStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// `-v` count.
    pub verbose: u8,
    pub quiet: bool,
    /// Directory to receive `error.log`, when enabled.
    pub error_log_dir: Option<PathBuf>,
    /// Progress display the console output must not collide with.
    pub progress: Option<MultiProgress>,
}

/// Filter directive for the given verbosity. `RUST_LOG` wins when set.
pub fn filter_directive(verbose: u8, quiet: bool) -> String {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => return DEFAULT_LOG_FILTER.to_string(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// Returns the guard of the error log writer; keep it alive for the app
/// lifetime so buffered lines are flushed on exit.
pub fn init_logging(options: LogOptions) -> crate::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(options.verbose, options.quiet)));

    let console = match options.progress {
        Some(multi) => fmt::layer()
            .with_ansi(true)
            .with_timer(LocalTimer)
            .with_writer(move || SuspendingStderr(multi.clone()))
            .boxed(),
        None => fmt::layer()
            .with_ansi(true)
            .with_timer(LocalTimer)
            .with_writer(io::stderr)
            .boxed(),
    };

    let (error_log, guard) = match options.error_log_dir {
        Some(dir) => {
            fs::ensure_dir_all_sync(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, ERROR_LOG_FILENAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .with_filter(LevelFilter::WARN);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(error_log)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert_eq!(filter_directive(0, false), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(filter_directive(1, false).contains("transfer_engine=debug"));
        assert!(filter_directive(3, false).starts_with("beatportdl=trace"));
        // quiet wins over verbose
        assert!(filter_directive(2, true).contains("catalog=warn"));
        assert!(EnvFilter::try_new(filter_directive(2, false)).is_ok());
    }
}
