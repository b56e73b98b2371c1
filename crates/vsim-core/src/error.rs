use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures while loading a replay capture.
///
/// Captures are raw instrument data; any of these aborts startup rather than
/// replaying a partial trace.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The capture file could not be opened or read.
    #[error("cannot read replay file {path}: {source}")]
    Io {
        /// Capture path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A field did not parse as the expected number.
    #[error("{path}:{line}: malformed {field} field `{text}`")]
    MalformedField {
        /// Capture path.
        path: PathBuf,
        /// 1-indexed line number.
        line: usize,
        /// Name of the column.
        field: &'static str,
        /// Offending text.
        text: String,
    },
    /// A row had the wrong number of columns.
    #[error("{path}:{line}: expected {expected} columns, found {found}")]
    ColumnCount {
        /// Capture path.
        path: PathBuf,
        /// 1-indexed line number.
        line: usize,
        /// Required column count.
        expected: usize,
        /// Columns present.
        found: usize,
    },
    /// A register field was outside the register window.
    #[error("{path}:{line}: register {value:#x} outside the register window")]
    RegisterOutOfRange {
        /// Capture path.
        path: PathBuf,
        /// 1-indexed line number.
        line: usize,
        /// Parsed register or address.
        value: u64,
    },
    /// The capture contained no usable register writes.
    #[error("{path}: no usable register writes")]
    Empty {
        /// Capture path.
        path: PathBuf,
    },
}

impl IngestError {
    /// Line the error refers to, when it refers to one.
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedField { line, .. }
            | Self::ColumnCount { line, .. }
            | Self::RegisterOutOfRange { line, .. } => Some(*line),
            Self::Io { .. } | Self::Empty { .. } => None,
        }
    }
}
