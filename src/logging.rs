//! Logging capability handed to the server, its workers and the client.
//!
//! Components never call the `log` macros directly; they log through an
//! injected [`Logger`] so tests can capture what a transfer reported.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter};

const TARGET: &str = "rtftp";

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

/// Forwards to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: TARGET, level, "{}", args);
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// True if any line at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, args.to_string()));
        }
    }
}

/// Install `env_logger` as the `log` backend.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init(default_level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
                record.level(),
                record.args()
            )
        });
    // A second init (tests, embedding) keeps the first backend.
    let _ = builder.try_init();
}

/// Log at error level and terminate the process
pub fn fatal(logger: &dyn Logger, args: fmt::Arguments<'_>) -> ! {
    logger.error(args);
    log::logger().flush();
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_records_levels() {
        let logger = MemoryLogger::new();
        logger.info(format_args!("sent {} blocks", 3));
        logger.warn(format_args!("peer went away"));

        assert!(logger.contains(Level::Info, "sent 3 blocks"));
        assert!(logger.contains(Level::Warn, "peer went away"));
        assert!(!logger.contains(Level::Error, "peer"));
        assert_eq!(logger.lines().len(), 2);
    }
}
