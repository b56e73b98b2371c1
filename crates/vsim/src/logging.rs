//! Process logger: console plus the run's log file.
//!
//! Records are filtered with `RUST_LOG` syntax (default `info`). Every
//! accepted record goes to the log file; records on the detail target are
//! kept out of the console.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use env_filter::{Builder, Filter};
use log::{Level, Log, Metadata, Record};
use vsim_core::DETAIL_TARGET;

use crate::output::OutputError;

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "vera_vsim.log";

const DEFAULT_FILTER: &str = "info";

/// Tee logger behind the `log` facade.
pub struct SimLogger {
    filter: Filter,
    file: Mutex<BufWriter<File>>,
}

impl SimLogger {
    /// Creates `<logdir>/vera_vsim.log` and installs the logger globally.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::LogFile`] when the file cannot be created and
    /// [`OutputError::LoggerInstalled`] when a logger is already set.
    pub fn install(logdir: &Path) -> Result<(), OutputError> {
        let path = logdir.join(LOG_FILE_NAME);
        let file = File::create(&path).map_err(|source| OutputError::LogFile { path, source })?;

        let mut builder = Builder::new();
        let spec = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        builder.parse(&spec);
        let filter = builder.build();
        let max_level = filter.filter();

        log::set_boxed_logger(Box::new(Self {
            filter,
            file: Mutex::new(BufWriter::new(file)),
        }))
        .map_err(|_| OutputError::LoggerInstalled)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

fn format_record(record: &Record<'_>) -> String {
    match record.level() {
        Level::Info => record.args().to_string(),
        Level::Warn => format!("warning: {}", record.args()),
        Level::Error => format!("error: {}", record.args()),
        level => format!("[{level} {}] {}", record.target(), record.args()),
    }
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.filter.matches(record) {
            return;
        }
        let line = format_record(record);
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
        if record.target() == DETAIL_TARGET {
            return;
        }
        if record.level() <= Level::Warn {
            let _ = writeln!(io::stderr(), "{line}");
        } else {
            let _ = writeln!(io::stdout(), "{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
        let _ = io::stdout().flush();
    }
}
