//! Host-side bus pin capability and its per-board adapters.

use crate::chip::BusLines;
use crate::config::Board;
use crate::regs::REGISTER_MASK;

/// What the sequencer needs from the external bus.
pub trait BusPins {
    /// Drives chip-select, the read/write strobes and the register address.
    ///
    /// `rd` and `wr` are logical (true = strobe active) and mutually exclusive.
    fn assert(&mut self, cs: bool, rd: bool, wr: bool, addr: u8);

    /// Presents a byte on the data bus.
    fn set_data(&mut self, value: u8);

    /// Byte currently driven by the chip.
    fn data(&self) -> u8;
}

/// Adapter for boards with separate read and write strobes.
#[derive(Debug)]
pub struct StrobedBus<'a> {
    lines: &'a mut BusLines,
}

impl<'a> StrobedBus<'a> {
    /// Wraps the chip's bus lines.
    pub fn new(lines: &'a mut BusLines) -> Self {
        Self { lines }
    }
}

impl BusPins for StrobedBus<'_> {
    fn assert(&mut self, cs: bool, rd: bool, wr: bool, addr: u8) {
        self.lines.cs_n = !cs;
        self.lines.rd_n = !rd;
        self.lines.wr_n = !wr;
        self.lines.addr = addr & REGISTER_MASK;
    }

    fn set_data(&mut self, value: u8) {
        self.lines.data_in = value;
    }

    fn data(&self) -> u8 {
        self.lines.data_out
    }
}

/// Adapter for boards with a single R/nW line on the write-strobe pin.
#[derive(Debug)]
pub struct ReadNotWriteBus<'a> {
    lines: &'a mut BusLines,
}

impl<'a> ReadNotWriteBus<'a> {
    /// Wraps the chip's bus lines.
    pub fn new(lines: &'a mut BusLines) -> Self {
        Self { lines }
    }
}

impl BusPins for ReadNotWriteBus<'_> {
    fn assert(&mut self, cs: bool, _rd: bool, wr: bool, addr: u8) {
        self.lines.cs_n = !cs;
        // R/nW idles in the read state; only an active write pulls it low.
        self.lines.wr_n = !(cs && wr);
        self.lines.rd_n = true;
        self.lines.addr = addr & REGISTER_MASK;
    }

    fn set_data(&mut self, value: u8) {
        self.lines.data_in = value;
    }

    fn data(&self) -> u8 {
        self.lines.data_out
    }
}

/// Runs `f` with the adapter matching `board` over `lines`.
pub fn with_board_pins<R>(
    board: Board,
    lines: &mut BusLines,
    f: impl FnOnce(&mut dyn BusPins) -> R,
) -> R {
    match board {
        Board::Strobed => f(&mut StrobedBus::new(lines)),
        Board::ReadNotWrite => f(&mut ReadNotWriteBus::new(lines)),
    }
}
