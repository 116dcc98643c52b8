//! Code implementing the logging solution for `hwtool`.

use std::io::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// The [`Log`] implementation installed by [`init`].
static LOGGER: StderrLogger = StderrLogger;

/// Installs the `hwtool` logger, enabling more output for higher `verbosity`.
pub fn init(verbosity: u8) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_filter(verbosity));
    }
}

/// Returns the most verbose [`LevelFilter`] enabled at `verbosity`.
fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Writes log records to standard error.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let prefix = match record.level() {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        };

        // Ignore any logging errors because there is no method to report or deal with them.
        let _ = writeln!(io::stderr().lock(), "{prefix}: {}", record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
