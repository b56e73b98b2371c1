//! Core of the VERA co-simulation driver.
//!
//! The driver feeds a simulated display controller with bus transactions,
//! watches its sync pins to find frames, and decodes its serial audio. Every
//! piece is an owned component; [`Simulation`] ticks them in a fixed order.

/// Log target for per-frame statistics and per-transaction bus detail.
///
/// Records on this target go to the log file only, never to the console.
pub const DETAIL_TARGET: &str = "vsim::detail";

/// External register map.
pub mod regs;
pub use regs::{register_for_address, REGISTER_COUNT, REGISTER_MASK, VERA_BASE, VERA_WINDOW_MASK};

/// Video geometry and run configuration.
pub mod config;
pub use config::{
    Board, SimConfig, VideoTiming, DEFAULT_BUS_CLOCK_KHZ, DEFAULT_MAX_FRAMES,
    DEFAULT_PIXEL_CLOCK_KHZ,
};

/// Pin-level chip contract.
pub mod chip;
pub use chip::{AudioOut, BusLines, Chip, PinSnapshot, VideoOut};

/// Bus-cycle pacing against the pixel clock.
pub mod timing;
pub use timing::{BusClock, ClockRatioError};

/// Replay ingestion errors.
pub mod error;
pub use error::IngestError;

/// Host-side bus: commands, pins, sequencer.
pub mod bus;
pub use bus::{
    with_board_pins, BusActivity, BusCommand, BusPins, BusTransactionState, Program, Sequencer,
    SequencerStats,
};

/// Captured register-write tables.
pub mod replay;
pub use replay::{
    load_analyzer_csv, load_video_log, AnalyzerOptions, ReplayEvent, ReplayTable, Timebase,
};

/// Frame detection from sync pins.
pub mod video;
pub use video::{FrameDetector, FrameEvent, GeometryMismatch, VideoSample};

/// Serial audio decoding.
pub mod audio;
pub use audio::{AudioEvent, I2sDecoder, StereoSample};

/// Behavioral chip model.
pub mod model;
pub use model::{BusTransaction, ReferenceChip};

/// VCD waveform output.
pub mod trace;
pub use trace::VcdWriter;

/// The simulation loop.
pub mod sim;
pub use sim::{NullObserver, RunSummary, SimObserver, Simulation, StopHandle, StopReason};

#[cfg(test)]
use proptest as _;
