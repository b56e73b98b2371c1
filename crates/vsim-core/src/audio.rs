//! Serial audio (I2S, left-justified) decoding.
//!
//! Data is shifted in MSB first on rising bit-clock edges into the half
//! selected by word select (low = left, high = right). A word-select rising
//! edge completes the left word; a falling edge completes the right word and
//! emits the stereo pair.

/// Bits kept per channel.
pub const SAMPLE_BITS: u32 = 24;

/// Sample rate assumed until a full word-select period has been measured.
pub const FALLBACK_SAMPLE_RATE_HZ: u32 = 48_828;

/// One decoded stereo frame of signed 24-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StereoSample {
    /// Left channel, sign-extended from 24 bits.
    pub left: i32,
    /// Right channel, sign-extended from 24 bits.
    pub right: i32,
}

impl StereoSample {
    /// Packs left then right as 24-bit little-endian.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 6] {
        let l = self.left.to_le_bytes();
        let r = self.right.to_le_bytes();
        [l[0], l[1], l[2], r[0], r[1], r[2]]
    }
}

/// Output of one decoder sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioEvent {
    /// First nonzero data bit of the run.
    pub started: bool,
    /// Stereo frame completed on this tick.
    pub sample: Option<StereoSample>,
}

/// Edge-driven I2S decoder sampled once per pixel clock.
#[derive(Debug, Clone, Default)]
pub struct I2sDecoder {
    bits: u32,
    left_acc: u32,
    right_acc: u32,
    left: i32,
    prev_bck: bool,
    prev_lrck: bool,
    started: bool,
    tick: u64,
    last_edge: Option<u64>,
    period: Option<u64>,
    samples: u64,
}

/// Sign-extends the low `bits` of `raw`, left-justified to 24 bits.
const fn sign_extend(raw: u32, bits: u32) -> i32 {
    if bits == 0 {
        return 0;
    }
    let aligned = raw << (SAMPLE_BITS - bits);
    #[allow(clippy::cast_possible_wrap)]
    let value = (aligned << 8) as i32;
    value >> 8
}

impl I2sDecoder {
    /// Decoder in its reset state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the three audio pins for one tick.
    pub fn sample(&mut self, bck: bool, lrck: bool, data: bool) -> AudioEvent {
        self.tick += 1;
        let mut event = AudioEvent::default();

        if data && !self.started {
            self.started = true;
            event.started = true;
        }

        if lrck != self.prev_lrck {
            if let Some(prev) = self.last_edge.replace(self.tick) {
                self.period = Some(2 * (self.tick - prev));
            }
            if lrck {
                self.left = sign_extend(self.left_acc, self.bits);
            } else {
                let right = sign_extend(self.right_acc, self.bits);
                event.sample = Some(StereoSample {
                    left: self.left,
                    right,
                });
                self.samples += 1;
            }
            self.bits = 0;
            self.left_acc = 0;
            self.right_acc = 0;
        }

        if bck && !self.prev_bck && self.bits < SAMPLE_BITS {
            let acc = if lrck {
                &mut self.right_acc
            } else {
                &mut self.left_acc
            };
            *acc = (*acc << 1) | u32::from(data);
            self.bits += 1;
        }

        self.prev_bck = bck;
        self.prev_lrck = lrck;
        event
    }

    /// Returns true once a nonzero data bit has been seen.
    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }

    /// Stereo frames emitted.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Word-select period in ticks, measured as twice the last half period.
    #[must_use]
    pub const fn period_ticks(&self) -> Option<u64> {
        self.period
    }

    /// Sample rate derived from the measured period, or the fallback rate.
    #[must_use]
    pub fn sample_rate_hz(&self, pixel_clock_hz: u64) -> u32 {
        self.period
            .filter(|&period| period > 0)
            .and_then(|period| u32::try_from(pixel_clock_hz / period).ok())
            .unwrap_or(FALLBACK_SAMPLE_RATE_HZ)
    }
}
