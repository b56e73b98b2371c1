//! Video geometry and top-level simulation configuration.

use crate::regs::AUDIO_CTRL;

/// Default pixel clock in kHz.
pub const DEFAULT_PIXEL_CLOCK_KHZ: u32 = 25_000;

/// Default external bus clock in kHz (host CPU PHI2).
pub const DEFAULT_BUS_CLOCK_KHZ: u32 = 8_000;

/// Default number of completed frames before the driver stops.
pub const DEFAULT_MAX_FRAMES: u32 = 3;

/// VGA scan geometry, polarity and pixel clock of the video output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VideoTiming {
    /// Pixel clock in kHz; one simulation tick is one pixel.
    pub pixel_clock_khz: u32,
    /// Active pixels per line.
    pub visible_width: u32,
    /// Active lines per frame.
    pub visible_height: u32,
    /// Pixels between active video and the hsync pulse.
    pub h_front_porch: u32,
    /// Width of the hsync pulse in pixels.
    pub h_sync_pulse: u32,
    /// Pixels between the hsync pulse and active video.
    pub h_back_porch: u32,
    /// Lines between active video and the vsync pulse.
    pub v_front_porch: u32,
    /// Height of the vsync pulse in lines.
    pub v_sync_pulse: u32,
    /// Lines between the vsync pulse and active video.
    pub v_back_porch: u32,
    /// Active level of the hsync pin.
    pub h_sync_active_high: bool,
    /// Active level of the vsync pin.
    pub v_sync_active_high: bool,
}

impl Default for VideoTiming {
    /// VGA 640x480 at 60 Hz on a 25 MHz pixel clock, both syncs active low.
    fn default() -> Self {
        Self {
            pixel_clock_khz: DEFAULT_PIXEL_CLOCK_KHZ,
            visible_width: 640,
            visible_height: 480,
            h_front_porch: 16,
            h_sync_pulse: 96,
            h_back_porch: 48,
            v_front_porch: 10,
            v_sync_pulse: 2,
            v_back_porch: 33,
            h_sync_active_high: false,
            v_sync_active_high: false,
        }
    }
}

impl VideoTiming {
    /// Pixels per scan line including blanking.
    #[must_use]
    pub const fn total_width(&self) -> u32 {
        self.visible_width + self.h_front_porch + self.h_sync_pulse + self.h_back_porch
    }

    /// Lines per frame including blanking.
    #[must_use]
    pub const fn total_height(&self) -> u32 {
        self.visible_height + self.v_front_porch + self.v_sync_pulse + self.v_back_porch
    }

    /// Pixel clock in Hz.
    #[must_use]
    pub fn pixel_clock_hz(&self) -> f64 {
        f64::from(self.pixel_clock_khz) * 1000.0
    }

    /// Converts a tick count into milliseconds of real time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ticks_to_ms(&self, ticks: u64) -> f64 {
        ticks as f64 * 1000.0 / self.pixel_clock_hz()
    }

    /// Nominal frame rate.
    #[must_use]
    pub fn frame_rate_hz(&self) -> f64 {
        self.pixel_clock_hz() / (f64::from(self.total_width()) * f64::from(self.total_height()))
    }
}

/// Physical mapping of the external bus control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Board {
    /// Separate active-low read and write strobes.
    #[default]
    Strobed,
    /// A single R/nW line (high = read) with the read strobe unused.
    ReadNotWrite,
}

impl Board {
    /// Parses the short name used on the command line.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "strobed" => Some(Self::Strobed),
            "rnw" => Some(Self::ReadNotWrite),
            _ => None,
        }
    }
}

/// Complete configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SimConfig {
    /// Video geometry the frame detector locks onto.
    pub timing: VideoTiming,
    /// External bus clock in kHz; must not exceed the pixel clock.
    pub bus_clock_khz: u32,
    /// Bus pin mapping.
    pub board: Board,
    /// Skip replay timestamp gaps until `fast_trigger_register` is written.
    pub fast_mode: bool,
    /// Register whose write ends fast mode.
    pub fast_trigger_register: u8,
    /// Stop after this many completed frames (`None` runs until stopped).
    pub max_frames: Option<u32>,
    /// Deliver half-tick pin snapshots for waveform tracing.
    pub trace: bool,
    /// Deliver per-pixel color samples.
    pub render: bool,
    /// Allowed difference between detected and configured frame height.
    pub height_tolerance: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timing: VideoTiming::default(),
            bus_clock_khz: DEFAULT_BUS_CLOCK_KHZ,
            board: Board::Strobed,
            fast_mode: false,
            fast_trigger_register: AUDIO_CTRL,
            max_frames: Some(DEFAULT_MAX_FRAMES),
            trace: false,
            render: true,
            height_tolerance: 0,
        }
    }
}
