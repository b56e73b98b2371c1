//! Fractional bus-cycle pacing against the pixel clock.

use thiserror::Error;

/// Rejected bus/pixel clock combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ClockRatioError {
    /// One of the clocks was zero.
    #[error("clock frequencies must be nonzero")]
    ZeroClock,
    /// The bus clock is faster than the pixel clock.
    #[error("bus clock {bus_khz} kHz exceeds pixel clock {pixel_khz} kHz")]
    BusFasterThanPixel {
        /// Requested bus clock.
        bus_khz: u32,
        /// Requested pixel clock.
        pixel_khz: u32,
    },
}

/// Integer accumulator that converts simulation ticks into bus cycles.
///
/// Every tick adds `bus_khz` to the accumulator; a bus cycle fires whenever the
/// accumulator reaches `pixel_khz`, which is then subtracted. The remainder is
/// carried, so after `n` ticks from reset exactly `floor(n * bus / pixel)`
/// cycles have fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusClock {
    bus_khz: u32,
    pixel_khz: u32,
    accumulator: u32,
    ticks: u64,
    cycles: u64,
}

impl BusClock {
    /// Creates a divider for a bus clocked at `bus_khz` against a `pixel_khz` tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClockRatioError`] when either clock is zero or the ratio
    /// exceeds one bus cycle per tick.
    pub const fn new(bus_khz: u32, pixel_khz: u32) -> Result<Self, ClockRatioError> {
        if bus_khz == 0 || pixel_khz == 0 {
            return Err(ClockRatioError::ZeroClock);
        }
        if bus_khz > pixel_khz {
            return Err(ClockRatioError::BusFasterThanPixel { bus_khz, pixel_khz });
        }
        Ok(Self {
            bus_khz,
            pixel_khz,
            accumulator: 0,
            ticks: 0,
            cycles: 0,
        })
    }

    /// Advances one simulation tick and reports whether a bus cycle occurred.
    #[allow(clippy::missing_const_for_fn)]
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.accumulator += self.bus_khz;
        if self.accumulator >= self.pixel_khz {
            self.accumulator -= self.pixel_khz;
            self.cycles += 1;
            true
        } else {
            false
        }
    }

    /// Bus cycles per tick as a float, for reporting.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.bus_khz) / f64::from(self.pixel_khz)
    }

    /// Ticks seen since construction.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Bus cycles fired since construction.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }
}
