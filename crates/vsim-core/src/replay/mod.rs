//! Normalized register-write captures for the sequencer's replay command.
//!
//! Two capture formats are understood:
//! - **Logic-analyzer CSV** ([`analyzer`]): single-bit columns sampled from the
//!   host CPU bus of real hardware.
//! - **Video-write log** ([`video_log`]): `timestamp, register, data` lines
//!   written by an emulator.
//!
//! Both produce the same [`ReplayTable`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::IngestError;

/// Logic-analyzer CSV ingestion.
pub mod analyzer;
/// Emulator video-write log ingestion.
pub mod video_log;

pub use analyzer::{parse_analyzer_csv, AnalyzerOptions};
pub use video_log::parse_video_log;

/// One captured register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ReplayEvent {
    /// Capture time in source units, relative to the start of the capture.
    pub timestamp: u64,
    /// Register index, 5 bits.
    pub register: u8,
    /// Data byte.
    pub data: u8,
    /// True for captured reads.
    pub is_read: bool,
}

impl ReplayEvent {
    /// A captured write.
    #[must_use]
    pub const fn write(timestamp: u64, register: u8, data: u8) -> Self {
        Self {
            timestamp,
            register,
            data,
            is_read: false,
        }
    }
}

/// Exact conversion from capture time units into bus cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timebase {
    /// Bus cycles per `units` capture units.
    pub bus_cycles: u64,
    /// Capture units per `bus_cycles` bus cycles.
    pub units: u64,
}

impl Default for Timebase {
    /// One capture unit per bus cycle.
    fn default() -> Self {
        Self {
            bus_cycles: 1,
            units: 1,
        }
    }
}

impl Timebase {
    /// Builds a timebase from a capture sample rate and the bus clock, both in Hz.
    #[must_use]
    pub const fn from_rates(sample_rate_hz: u64, bus_clock_hz: u64) -> Self {
        Self {
            bus_cycles: bus_clock_hz,
            units: sample_rate_hz,
        }
    }

    /// Converts a capture-time delta into whole bus cycles (rounded down).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_cycles(self, delta: u64) -> u64 {
        if self.units == 0 {
            return delta;
        }
        (delta as u128 * self.bus_cycles as u128 / self.units as u128) as u64
    }
}

/// Timestamp-ordered capture ready for replay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayTable {
    events: Vec<ReplayEvent>,
    timebase: Timebase,
}

impl ReplayTable {
    /// Wraps events already in timestamp order.
    #[must_use]
    pub const fn new(events: Vec<ReplayEvent>, timebase: Timebase) -> Self {
        Self { events, timebase }
    }

    /// Replaces the timebase.
    #[must_use]
    pub fn with_timebase(mut self, timebase: Timebase) -> Self {
        self.timebase = timebase;
        self
    }

    /// Event at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ReplayEvent> {
        self.events.get(index)
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true without events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in order.
    #[must_use]
    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    /// Time conversion used for pacing.
    #[must_use]
    pub const fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// Bus-cycle offset of event `index` from the first event.
    #[must_use]
    pub fn offset_cycles(&self, index: usize) -> u64 {
        let first = self.events.first().map_or(0, |event| event.timestamp);
        self.events.get(index).map_or(0, |event| {
            self.timebase
                .to_cycles(event.timestamp.saturating_sub(first))
        })
    }

    /// Capture span in bus cycles.
    #[must_use]
    pub fn span_cycles(&self) -> u64 {
        self.events
            .len()
            .checked_sub(1)
            .map_or(0, |last| self.offset_cycles(last))
    }
}

/// Loads a logic-analyzer CSV capture.
///
/// # Errors
///
/// Returns [`IngestError`] when the file is unreadable, malformed or holds no
/// qualifying writes.
pub fn load_analyzer_csv(path: &Path, options: &AnalyzerOptions) -> Result<ReplayTable, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_analyzer_csv(BufReader::new(file), path, options)
}

/// Loads an emulator video-write log.
///
/// # Errors
///
/// Returns [`IngestError`] when the file is unreadable, malformed or empty.
pub fn load_video_log(path: &Path) -> Result<ReplayTable, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_video_log(BufReader::new(file), path)
}

#[cfg(test)]
mod tests {
    use super::{ReplayEvent, ReplayTable, Timebase};

    #[test]
    fn timebase_scales_exactly() {
        let tb = Timebase::from_rates(24_000_000, 8_000_000);
        assert_eq!(tb.to_cycles(3), 1);
        assert_eq!(tb.to_cycles(2), 0);
        assert_eq!(tb.to_cycles(300), 100);
        assert_eq!(Timebase::default().to_cycles(42), 42);
    }

    #[test]
    fn offsets_are_relative_to_first_event() {
        let table = ReplayTable::new(
            vec![
                ReplayEvent::write(100, 0, 1),
                ReplayEvent::write(110, 1, 2),
                ReplayEvent::write(160, 2, 3),
            ],
            Timebase::default(),
        );
        assert_eq!(table.offset_cycles(0), 0);
        assert_eq!(table.offset_cycles(1), 10);
        assert_eq!(table.span_cycles(), 60);
        assert_eq!(table.offset_cycles(9), 0);
    }

    #[test]
    fn empty_table_spans_nothing() {
        assert_eq!(ReplayTable::default().span_cycles(), 0);
        assert!(ReplayTable::default().is_empty());
    }
}
