//! Pin-level contract of the simulated display controller.
//!
//! The driver never looks inside the chip: it drives the clock, the external
//! bus lines and evaluation, then samples video and audio output pins.

/// External bus lines shared between the driver and the chip.
///
/// All control lines are active low and idle high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusLines {
    /// Chip select.
    pub cs_n: bool,
    /// Read strobe. Unused on R/nW boards, where it stays high.
    pub rd_n: bool,
    /// Write strobe, or the R/nW line on R/nW boards (high = read).
    pub wr_n: bool,
    /// Register address, 5 bits.
    pub addr: u8,
    /// Data driven by the host.
    pub data_in: u8,
    /// Data driven by the chip during reads.
    pub data_out: u8,
}

impl Default for BusLines {
    fn default() -> Self {
        Self {
            cs_n: true,
            rd_n: true,
            wr_n: true,
            addr: 0,
            data_in: 0,
            data_out: 0,
        }
    }
}

impl BusLines {
    /// Returns true while a write transaction is presented.
    #[must_use]
    pub const fn write_active(&self) -> bool {
        !self.cs_n && !self.wr_n
    }

    /// Returns true while a read transaction is presented.
    #[must_use]
    pub const fn read_active(&self) -> bool {
        !self.cs_n && self.wr_n
    }
}

/// Raw VGA output levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VideoOut {
    /// Horizontal sync pin level.
    pub hsync: bool,
    /// Vertical sync pin level.
    pub vsync: bool,
    /// Red, 4 bits.
    pub red: u8,
    /// Green, 4 bits.
    pub green: u8,
    /// Blue, 4 bits.
    pub blue: u8,
}

impl VideoOut {
    /// Expands the 4-bit guns to 8-bit RGB.
    #[must_use]
    pub const fn rgb888(&self) -> [u8; 3] {
        [
            (self.red << 4) | (self.red & 0x0F),
            (self.green << 4) | (self.green & 0x0F),
            (self.blue << 4) | (self.blue & 0x0F),
        ]
    }
}

/// Raw serial audio output levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AudioOut {
    /// Bit clock.
    pub bck: bool,
    /// Word select; low = left, high = right.
    pub lrck: bool,
    /// Serial data.
    pub data: bool,
}

/// The simulated chip as seen from its pins.
pub trait Chip {
    /// Drives the clock input.
    fn set_clock(&mut self, high: bool);

    /// Evaluates the model with the current inputs.
    fn eval(&mut self);

    /// Current external bus lines.
    fn bus(&self) -> &BusLines;

    /// Mutable access to the external bus lines for the host side.
    fn bus_mut(&mut self) -> &mut BusLines;

    /// Current video output pins.
    fn video(&self) -> VideoOut;

    /// Current audio output pins.
    fn audio(&self) -> AudioOut;

    /// Returns true once the model requests the simulation to end.
    fn finished(&self) -> bool {
        false
    }

    /// Final evaluation before the model is dropped.
    fn finish(&mut self) {}
}

/// Snapshot of every traced pin at one half-tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PinSnapshot {
    /// Clock level.
    pub clk: bool,
    /// External bus.
    pub bus: BusLines,
    /// Video output.
    pub video: VideoOut,
    /// Audio output.
    pub audio: AudioOut,
}

impl PinSnapshot {
    /// Captures the pins of `chip` with the given clock level.
    pub fn capture<C: Chip + ?Sized>(chip: &C, clk: bool) -> Self {
        Self {
            clk,
            bus: *chip.bus(),
            video: chip.video(),
            audio: chip.audio(),
        }
    }
}
