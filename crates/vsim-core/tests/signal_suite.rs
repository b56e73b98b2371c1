//! Frame detection and audio decoding against synthetic pin streams.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use log as _;
use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use tempfile as _;
use thiserror as _;
use vsim_core::audio::FALLBACK_SAMPLE_RATE_HZ;
use vsim_core::{FrameDetector, FrameEvent, I2sDecoder, StereoSample, VideoTiming};

/// Timing whose total frame is `period` pixels by `lines` lines, active-high syncs.
fn synthetic_timing(period: u32, pulse: u32, lines: u32) -> VideoTiming {
    VideoTiming {
        pixel_clock_khz: 1_000,
        visible_width: period - pulse - 2,
        visible_height: lines - 3,
        h_front_porch: 1,
        h_sync_pulse: pulse,
        h_back_porch: 1,
        v_front_porch: 1,
        v_sync_pulse: 1,
        v_back_porch: 1,
        h_sync_active_high: true,
        v_sync_active_high: true,
    }
}

/// Feeds `frames` frames of `lines` hsync pulses, each `pulse` wide in a
/// `period`, with vsync asserted over the last line. Returns frame events.
fn feed(det: &mut FrameDetector, period: u32, pulse: u32, lines: u32, frames: u32) -> Vec<FrameEvent> {
    let mut events = Vec::new();
    for _ in 0..frames {
        for line in 0..lines {
            for px in 0..period {
                let sample = det.sample(px < pulse, line == lines - 1);
                events.extend(sample.frame);
            }
        }
    }
    events
}

proptest! {
    #[test]
    fn one_locked_frame_reports_pulse_width_and_count(
        period in 8u32..64,
        pulse_frac in 1u32..4,
        lines in 4u32..40,
    ) {
        let pulse = (period * pulse_frac / 8).max(1);
        let timing = synthetic_timing(period, pulse, lines);
        let mut det = FrameDetector::new(timing, 0);

        // first frame locks onto the geometry, the second is reported
        let events = feed(&mut det, period, pulse, lines, 2);
        let closing = det.sample(false, false);
        let events: Vec<FrameEvent> = events.into_iter().chain(closing.frame).collect();

        prop_assert_eq!(events.len(), 1);
        let frame = events[0];
        prop_assert_eq!(frame.index, 0);
        prop_assert_eq!(frame.hsync_max, pulse);
        prop_assert_eq!(frame.hsync_min, pulse);
        prop_assert_eq!(frame.height, lines);
        prop_assert_eq!(frame.width, period);
        prop_assert_eq!(frame.ticks, u64::from(period * lines));
    }
}

#[test]
fn mismatched_frames_never_lock() {
    let timing = synthetic_timing(16, 4, 10);
    let mut det = FrameDetector::new(timing, 0);
    let events = feed(&mut det, 16, 4, 9, 4);
    assert!(events.is_empty());
    assert!(!det.is_synchronized());
    assert_eq!(det.max_geometry(), (16, 9));
}

#[test]
fn frame_duration_uses_pixel_clock() {
    let timing = synthetic_timing(20, 4, 10);
    let mut det = FrameDetector::new(timing, 0);
    feed(&mut det, 20, 4, 10, 2);
    let frame = det.sample(false, false).frame.expect("second frame reported");
    // 200 ticks at 1 MHz
    assert!((frame.duration_ms - 0.2).abs() < 1e-9);
}

/// Serializes one stereo frame MSB first, left-justified, `bits` per half,
/// four ticks per bit-clock phase. Data changes while the bit clock is low.
fn serialize(left: i32, right: i32, bits: u32) -> Vec<(bool, bool, bool)> {
    let mut pins = Vec::new();
    for (lrck, word) in [(false, left), (true, right)] {
        for bit in 0..bits {
            let data = bit < 24 && (word >> (23 - bit)) & 1 != 0;
            for phase in 0..8 {
                pins.push((phase >= 4, lrck, data));
            }
        }
    }
    pins
}

fn decode(frames: &[(i32, i32)], bits: u32) -> (I2sDecoder, Vec<StereoSample>) {
    let mut decoder = I2sDecoder::new();
    let mut samples = Vec::new();
    let mut stream: Vec<(bool, bool, bool)> = frames
        .iter()
        .flat_map(|&(l, r)| serialize(l, r, bits))
        .collect();
    // a final falling word-select edge closes the last right half
    stream.push((false, false, false));
    for (bck, lrck, data) in stream {
        samples.extend(decoder.sample(bck, lrck, data).sample);
    }
    (decoder, samples)
}

#[rstest]
#[case(0x7F_FFFF, -0x80_0000)]
#[case(-1, 1)]
#[case(0x12_3456, -0x12_3456)]
#[case(0, 0x40_0000)]
fn decoder_reproduces_24_bit_words(#[case] left: i32, #[case] right: i32) {
    let (_, samples) = decode(&[(left, right)], 32);
    assert_eq!(samples, vec![StereoSample { left, right }]);
}

proptest! {
    #[test]
    fn decoder_is_bit_exact_for_any_words(
        words in proptest::collection::vec((-0x80_0000i32..0x80_0000, -0x80_0000i32..0x80_0000), 1..6),
    ) {
        let (decoder, samples) = decode(&words, 32);
        let expected: Vec<StereoSample> = words
            .iter()
            .map(|&(left, right)| StereoSample { left, right })
            .collect();
        prop_assert_eq!(samples, expected);
        prop_assert_eq!(decoder.period_ticks(), Some(512));
    }
}

#[test]
fn recording_starts_on_first_nonzero_bit_only_once() {
    let mut decoder = I2sDecoder::new();
    let mut starts = 0;
    for (bck, lrck, data) in serialize(0, 0, 32)
        .into_iter()
        .chain(serialize(0x40_0000, 0x40_0000, 32))
    {
        if decoder.sample(bck, lrck, data).started {
            starts += 1;
        }
    }
    assert_eq!(starts, 1);
    assert!(decoder.started());
}

#[test]
fn sample_rate_falls_back_until_measured() {
    let decoder = I2sDecoder::new();
    assert_eq!(decoder.period_ticks(), None);
    assert_eq!(decoder.sample_rate_hz(512_000), FALLBACK_SAMPLE_RATE_HZ);
    let (decoder, _) = decode(&[(1, 1)], 32);
    assert_eq!(decoder.sample_rate_hz(512_000), 1_000);
    assert_eq!(decoder.sample_rate_hz(25_000_000), 48_828);
}
