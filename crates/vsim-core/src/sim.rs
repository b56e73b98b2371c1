//! The tick loop tying the chip, bus sequencer, frame detector and audio
//! decoder together.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::{I2sDecoder, StereoSample};
use crate::bus::{with_board_pins, Program, Sequencer, SequencerStats};
use crate::chip::{Chip, PinSnapshot};
use crate::config::SimConfig;
use crate::replay::ReplayTable;
use crate::timing::{BusClock, ClockRatioError};
use crate::video::{FrameDetector, FrameEvent};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// The stop flag was raised, usually by Ctrl-C.
    Interrupted,
    /// The bus program executed `Done`.
    ProgramDone,
    /// The configured number of frames completed.
    FrameLimit,
    /// An observer asked to stop, for example because its window closed.
    ObserverRequested,
    /// The chip model signalled the end of simulation.
    ChipFinished,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Interrupted => "interrupted",
            Self::ProgramDone => "bus program done",
            Self::FrameLimit => "frame limit reached",
            Self::ObserverRequested => "stopped by observer",
            Self::ChipFinished => "chip finished",
        };
        f.write_str(text)
    }
}

/// Cooperative cancellation flag shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag; the loop stops at the end of the current tick.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once a stop was requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives everything the loop produces.
///
/// All hooks default to doing nothing so sinks implement only what they use.
pub trait SimObserver {
    /// Pin levels after each clock edge, while tracing.
    fn on_half_tick(&mut self, _time: u64, _pins: &PinSnapshot) {}

    /// Color of the pixel at `(x, y)` of a synchronized frame, while rendering.
    fn on_pixel(&mut self, _x: u32, _y: u32, _rgb: [u8; 3]) {}

    /// A synchronized frame completed.
    fn on_frame(&mut self, _frame: &FrameEvent) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// The audio stream started at `sample_rate_hz`.
    fn on_audio_start(&mut self, _sample_rate_hz: u32) {}

    /// One decoded stereo frame after the stream started.
    fn on_audio_sample(&mut self, _sample: StereoSample) {}

    /// Called once per tick after all other hooks.
    fn poll(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SimObserver for NullObserver {}

/// Totals reported when a run ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Why the run ended.
    pub reason: StopReason,
    /// Synchronized frames completed.
    pub frames: u32,
    /// Pixel clock ticks simulated.
    pub ticks: u64,
    /// `ticks` in milliseconds of real time.
    pub elapsed_ms: f64,
    /// Bus sequencer counters.
    pub bus: SequencerStats,
    /// Stereo frames decoded after the audio stream started.
    pub audio_samples: u64,
    /// Widest line and tallest frame seen.
    pub max_geometry: (u32, u32),
}

/// One simulated system: chip plus host-side driver state.
#[derive(Debug)]
pub struct Simulation<C: Chip> {
    config: SimConfig,
    chip: C,
    clock: BusClock,
    sequencer: Sequencer,
    detector: FrameDetector,
    audio: I2sDecoder,
    stop: StopHandle,
    time: u64,
    frames_completed: u32,
    audio_samples: u64,
}

impl<C: Chip> Simulation<C> {
    /// Builds a simulation running `program` against `chip`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockRatioError`] when the configured bus clock cannot be
    /// derived from the pixel clock.
    pub fn new(
        config: SimConfig,
        chip: C,
        program: Program,
        replay: Option<ReplayTable>,
    ) -> Result<Self, ClockRatioError> {
        let clock = BusClock::new(config.bus_clock_khz, config.timing.pixel_clock_khz)?;
        let mut sequencer =
            Sequencer::new(program).with_fast_mode(config.fast_mode, config.fast_trigger_register);
        if let Some(table) = replay {
            sequencer = sequencer.with_replay(table);
        }
        let detector = FrameDetector::new(config.timing, config.height_tolerance);
        Ok(Self {
            config,
            chip,
            clock,
            sequencer,
            detector,
            audio: I2sDecoder::new(),
            stop: StopHandle::new(),
            time: 0,
            frames_completed: 0,
            audio_samples: 0,
        })
    }

    /// Flag that stops the run from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn tracing(&self) -> bool {
        self.config.trace
            && self
                .config
                .max_frames
                .is_none_or(|max| self.frames_completed < max)
    }

    fn half_tick(&mut self, clk: bool, observer: &mut dyn SimObserver) {
        self.chip.set_clock(clk);
        self.chip.eval();
        if self.tracing() {
            observer.on_half_tick(self.time, &PinSnapshot::capture(&self.chip, clk));
        }
        self.time += 1;
    }

    /// Simulates one pixel clock.
    pub fn tick(&mut self, observer: &mut dyn SimObserver) -> ControlFlow<StopReason> {
        if self.clock.tick() {
            let sequencer = &mut self.sequencer;
            with_board_pins(self.config.board, self.chip.bus_mut(), |pins| {
                sequencer.step(pins)
            });
        }

        self.half_tick(true, observer);
        self.half_tick(false, observer);

        let video = self.chip.video();
        let sample = self.detector.sample(video.hsync, video.vsync);
        if self.config.render && sample.synchronized && sample.in_raster {
            observer.on_pixel(sample.x, sample.y, video.rgb888());
        }
        if sample.vsync_end {
            self.sequencer.notify_vsync();
        }
        if let Some(frame) = sample.frame {
            self.frames_completed += 1;
            if observer.on_frame(&frame).is_break() {
                return ControlFlow::Break(StopReason::ObserverRequested);
            }
            if self
                .config
                .max_frames
                .is_some_and(|max| self.frames_completed >= max)
            {
                return ControlFlow::Break(StopReason::FrameLimit);
            }
        }

        let pins = self.chip.audio();
        let event = self.audio.sample(pins.bck, pins.lrck, pins.data);
        if event.started {
            let rate = self
                .audio
                .sample_rate_hz(u64::from(self.config.timing.pixel_clock_khz) * 1000);
            log::info!("audio detected at tick {}, {rate} Hz", self.time / 2);
            self.sequencer.set_fast_mode(false);
            observer.on_audio_start(rate);
        }
        if let Some(stereo) = event.sample.filter(|_| self.audio.started()) {
            self.audio_samples += 1;
            observer.on_audio_sample(stereo);
        }

        if observer.poll().is_break() {
            return ControlFlow::Break(StopReason::ObserverRequested);
        }
        if self.sequencer.is_finished() {
            return ControlFlow::Break(StopReason::ProgramDone);
        }
        if self.stop.is_stop_requested() {
            return ControlFlow::Break(StopReason::Interrupted);
        }
        if self.chip.finished() {
            return ControlFlow::Break(StopReason::ChipFinished);
        }
        ControlFlow::Continue(())
    }

    /// Runs until a stop condition, then finalizes the chip.
    pub fn run(&mut self, observer: &mut dyn SimObserver) -> RunSummary {
        log::info!(
            "Video {}x{} with {:.3} MHz clock, {:.3} Hz FPS, bus {} kHz",
            self.config.timing.visible_width,
            self.config.timing.visible_height,
            self.config.timing.pixel_clock_hz() / 1e6,
            self.config.timing.frame_rate_hz(),
            self.config.bus_clock_khz
        );
        let reason = loop {
            if let ControlFlow::Break(reason) = self.tick(observer) {
                break reason;
            }
        };
        self.chip.finish();
        let summary = self.summary(reason);
        log::info!("stopping: {reason}");
        summary
    }

    /// Totals so far, reported as ending for `reason`.
    #[must_use]
    pub fn summary(&self, reason: StopReason) -> RunSummary {
        let ticks = self.time / 2;
        RunSummary {
            reason,
            frames: self.frames_completed,
            ticks,
            elapsed_ms: self.config.timing.ticks_to_ms(ticks),
            bus: *self.sequencer.stats(),
            audio_samples: self.audio_samples,
            max_geometry: self.detector.max_geometry(),
        }
    }

    /// The simulated chip.
    #[must_use]
    pub const fn chip(&self) -> &C {
        &self.chip
    }

    /// The bus sequencer.
    #[must_use]
    pub const fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// The frame detector.
    #[must_use]
    pub const fn detector(&self) -> &FrameDetector {
        &self.detector
    }

    /// Configuration of this run.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Half-tick counter (two per pixel clock).
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Synchronized frames completed.
    #[must_use]
    pub const fn frames_completed(&self) -> u32 {
        self.frames_completed
    }

    /// Consumes the simulation and returns the chip.
    pub fn into_chip(self) -> C {
        self.chip
    }
}
