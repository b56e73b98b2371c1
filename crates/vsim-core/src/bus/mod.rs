//! Host side of the external register bus.

/// Bus command language and programs.
pub mod command;
/// Bus pin capability and board adapters.
pub mod pins;
/// Program executor.
pub mod sequencer;
/// Byte streams behind array and file commands.
pub mod source;

pub use command::{BusCommand, Program};
pub use pins::{with_board_pins, BusPins, ReadNotWriteBus, StrobedBus};
pub use sequencer::{BusActivity, BusTransactionState, Sequencer, SequencerStats};
pub use source::{ByteSource, FileSource, ReadCapture, SliceSource};
