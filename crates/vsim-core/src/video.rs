//! Video timing extraction from raw sync pins.
//!
//! The detector counts pixel clocks between sync edges. The end of an hsync
//! pulse closes a line; the end of a vsync pulse closes a frame. Frame indices
//! are only assigned once a frame of the configured total height has been
//! seen, so a run that starts mid-frame locks on at the first clean frame.

use crate::config::VideoTiming;
use crate::DETAIL_TARGET;

/// Statistics of one completed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEvent {
    /// Frame index, counted from the first synchronized frame.
    pub index: u32,
    /// Tick at which the frame ended.
    pub end_tick: u64,
    /// Pixel clocks since the previous frame end.
    pub ticks: u64,
    /// `ticks` in milliseconds of real time.
    pub duration_ms: f64,
    /// Longest line of the frame in pixel clocks.
    pub width: u32,
    /// Lines in the frame.
    pub height: u32,
    /// Shortest hsync pulse.
    pub hsync_min: u32,
    /// Longest hsync pulse.
    pub hsync_max: u32,
    /// Lines that ended while vsync was active.
    pub vsync_lines: u32,
}

/// A frame whose height disagreed with the configured total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryMismatch {
    /// Lines counted.
    pub detected_height: u32,
    /// Configured total lines.
    pub expected_height: u32,
}

/// Result of sampling one pixel clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSample {
    /// Column of the sampled pixel.
    pub x: u32,
    /// Row of the sampled pixel.
    pub y: u32,
    /// True when the pixel belongs to a synchronized frame.
    pub synchronized: bool,
    /// `(x, y)` lies inside the configured total raster. Rows counted past
    /// the last line, before vsync closes the frame, fall outside.
    pub in_raster: bool,
    /// An hsync pulse ended on this tick.
    pub hsync_end: bool,
    /// A vsync pulse ended on this tick.
    pub vsync_end: bool,
    /// Frame statistics, when a synchronized frame ended.
    pub frame: Option<FrameEvent>,
    /// Height mismatch, when a frame ended with the wrong geometry.
    pub mismatch: Option<GeometryMismatch>,
}

/// Sync edge tracker and frame counter.
#[derive(Debug, Clone)]
pub struct FrameDetector {
    timing: VideoTiming,
    height_tolerance: u32,
    x: u32,
    y: u32,
    prev_hsync: bool,
    prev_vsync: bool,
    hsync_count: u32,
    hsync_min: u32,
    hsync_max: u32,
    vsync_lines: u32,
    width: u32,
    max_width: u32,
    max_height: u32,
    frame: Option<u32>,
    tick: u64,
    frame_start: u64,
}

impl FrameDetector {
    /// Creates a detector expecting `timing`, accepting frames whose height is
    /// within `height_tolerance` lines of the configured total.
    #[must_use]
    pub const fn new(timing: VideoTiming, height_tolerance: u32) -> Self {
        Self {
            timing,
            height_tolerance,
            x: 0,
            y: 0,
            prev_hsync: false,
            prev_vsync: false,
            hsync_count: 0,
            hsync_min: 0,
            hsync_max: 0,
            vsync_lines: 0,
            width: 0,
            max_width: 0,
            max_height: 0,
            frame: None,
            tick: 0,
            frame_start: 0,
        }
    }

    /// Samples the raw sync pin levels for one pixel clock.
    pub fn sample(&mut self, hsync_pin: bool, vsync_pin: bool) -> VideoSample {
        let hsync = hsync_pin == self.timing.h_sync_active_high;
        let vsync = vsync_pin == self.timing.v_sync_active_high;
        self.tick += 1;

        let mut out = VideoSample {
            x: self.x,
            y: self.y,
            synchronized: self.frame.is_some(),
            in_raster: self.x < self.timing.total_width() && self.y < self.timing.total_height(),
            hsync_end: false,
            vsync_end: false,
            frame: None,
            mismatch: None,
        };
        self.x = self.x.saturating_add(1);

        if hsync {
            self.hsync_count = self.hsync_count.saturating_add(1);
        }
        if !hsync && self.prev_hsync {
            out.hsync_end = true;
            self.end_line(vsync);
        }
        self.prev_hsync = hsync;

        if !vsync && self.prev_vsync {
            out.vsync_end = true;
            self.end_frame(&mut out);
        }
        self.prev_vsync = vsync;
        out
    }

    fn end_line(&mut self, vsync: bool) {
        self.hsync_max = self.hsync_max.max(self.hsync_count);
        if self.hsync_min == 0 || self.hsync_count < self.hsync_min {
            self.hsync_min = self.hsync_count;
        }
        self.hsync_count = 0;
        self.width = self.width.max(self.x);
        self.max_width = self.max_width.max(self.x);
        self.x = 0;
        self.y = self.y.saturating_add(1);
        if vsync {
            self.vsync_lines = self.vsync_lines.saturating_add(1);
        }
    }

    fn end_frame(&mut self, out: &mut VideoSample) {
        let height = self.y;
        let ticks = self.tick - self.frame_start;
        self.max_height = self.max_height.max(height);

        if let Some(index) = self.frame {
            let event = FrameEvent {
                index,
                end_tick: self.tick,
                ticks,
                duration_ms: self.timing.ticks_to_ms(ticks),
                width: self.width,
                height,
                hsync_min: self.hsync_min,
                hsync_max: self.hsync_max,
                vsync_lines: self.vsync_lines,
            };
            log::info!(
                target: DETAIL_TARGET,
                "[@t={:8}] Frame {:3}, {} pixel-clocks ({:.3} msec real-time), {}x{} hsync {}, vsync {}",
                event.end_tick,
                event.index,
                event.ticks,
                event.duration_ms,
                event.width,
                event.height,
                event.hsync_max,
                event.vsync_lines
            );
            out.frame = Some(event);
        }

        let expected = self.timing.total_height();
        if height.abs_diff(expected) <= self.height_tolerance {
            self.frame = Some(self.frame.map_or(0, |index| index + 1));
        } else {
            let mismatch = GeometryMismatch {
                detected_height: height,
                expected_height: expected,
            };
            if self.frame.is_some() {
                log::warn!("frame height {height} lines, expected {expected}");
            } else {
                log::debug!("waiting for sync: frame height {height} lines, expected {expected}");
            }
            out.mismatch = Some(mismatch);
        }

        self.frame_start = self.tick;
        self.width = 0;
        self.hsync_min = 0;
        self.hsync_max = 0;
        self.vsync_lines = 0;
        self.y = 0;
    }

    /// Index the next completed frame will carry, once synchronized.
    #[must_use]
    pub const fn frame_index(&self) -> Option<u32> {
        self.frame
    }

    /// Returns true once a full-height frame has been seen.
    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        self.frame.is_some()
    }

    /// Widest line and tallest frame observed so far.
    #[must_use]
    pub const fn max_geometry(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    /// Pixel clocks sampled.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Geometry the detector locks onto.
    #[must_use]
    pub const fn timing(&self) -> &VideoTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::FrameDetector;
    use crate::config::VideoTiming;

    fn tiny() -> VideoTiming {
        VideoTiming {
            pixel_clock_khz: 1_000,
            visible_width: 8,
            visible_height: 4,
            h_front_porch: 1,
            h_sync_pulse: 2,
            h_back_porch: 1,
            v_front_porch: 1,
            v_sync_pulse: 1,
            v_back_porch: 1,
            h_sync_active_high: true,
            v_sync_active_high: true,
        }
    }

    #[test]
    fn polarity_follows_timing() {
        let mut timing = tiny();
        timing.h_sync_active_high = false;
        let mut det = FrameDetector::new(timing, 0);
        // low is active: a high level after a low one ends the pulse
        assert!(!det.sample(false, false).hsync_end);
        assert!(det.sample(true, false).hsync_end);
    }

    #[test]
    fn first_matching_frame_only_synchronizes() {
        let timing = tiny();
        let mut det = FrameDetector::new(timing, 0);
        let width = timing.total_width();
        let height = timing.total_height();
        let mut events = Vec::new();
        for _ in 0..2 {
            for line in 0..height {
                for px in 0..width {
                    let hs = px >= width - timing.h_sync_pulse;
                    let vs = line == height - 1;
                    // vsync drops on the first pixel of the next frame
                    let sample = det.sample(hs, vs);
                    events.extend(sample.frame);
                }
            }
        }
        // closing edge of the second frame arrives on the next tick
        events.extend(det.sample(false, false).frame);
        assert_eq!(det.frame_index(), Some(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[0].height, height);
        assert_eq!(events[0].hsync_max, timing.h_sync_pulse);
    }

    #[test]
    fn rows_past_the_last_line_are_outside_the_raster() {
        let timing = tiny();
        let mut det = FrameDetector::new(timing, 0);
        let width = timing.total_width();
        let height = timing.total_height();
        let mut outside = 0;
        for _ in 0..3 {
            for line in 0..height {
                for px in 0..width {
                    // hsync mid-line, vsync ending at the start of a line
                    let hs = (4..6).contains(&px);
                    let vs = line == height - 1;
                    let sample = det.sample(hs, vs);
                    if !sample.synchronized {
                        continue;
                    }
                    if sample.in_raster {
                        assert!(sample.x < width && sample.y < height, "{sample:?}");
                    } else {
                        assert_eq!(sample.y, height);
                        outside += 1;
                    }
                }
            }
        }
        assert!(det.is_synchronized());
        assert!(outside > 0);
    }

    #[test]
    fn counters_saturate_without_sync_edges() {
        let mut det = FrameDetector::new(tiny(), 0);
        det.x = u32::MAX - 1;
        det.hsync_count = u32::MAX - 1;
        for _ in 0..3 {
            let sample = det.sample(true, false);
            assert!(!sample.in_raster);
        }
        assert_eq!((det.x, det.hsync_count), (u32::MAX, u32::MAX));
    }

    #[test]
    fn short_frame_reports_mismatch() {
        let mut det = FrameDetector::new(tiny(), 0);
        det.sample(true, true);
        det.sample(false, true);
        let sample = det.sample(false, false);
        assert!(sample.vsync_end);
        let mismatch = sample.mismatch.expect("one line is not a frame");
        assert_eq!(mismatch.detected_height, 1);
        assert_eq!(mismatch.expected_height, 7);
        assert!(!det.is_synchronized());
    }

    #[test]
    fn tolerance_accepts_near_heights() {
        let mut det = FrameDetector::new(tiny(), 6);
        det.sample(true, true);
        det.sample(false, true);
        det.sample(false, false);
        assert!(det.is_synchronized());
    }
}
