//! Behavioral stand-in for the display controller.
//!
//! [`ReferenceChip`] implements the [`Chip`] pin contract closely enough to
//! drive every part of the simulation loop: it generates syncs for a
//! [`VideoTiming`], decodes the external bus, keeps a VRAM behind the
//! address/data registers, scans VRAM out as grayscale and serializes the
//! audio FIFO as I2S.

use std::collections::VecDeque;

use crate::chip::{AudioOut, BusLines, Chip, VideoOut};
use crate::config::VideoTiming;
use crate::regs::{
    ADDR_H, ADDR_L, ADDR_M, AUDIO_CTRL, AUDIO_DATA, DATA0, DATA1, ISR, REGISTER_COUNT,
    REGISTER_MASK,
};

/// VRAM size in bytes.
pub const VRAM_SIZE: usize = 0x2_0000;

const VRAM_ADDR_MASK: u32 = 0x1_FFFF;

/// Audio FIFO depth in bytes.
pub const AUDIO_FIFO_DEPTH: usize = 4096;

/// Pixel clocks per I2S bit.
pub const I2S_BIT_TICKS: u32 = 8;

/// Bit clocks per I2S frame (both halves).
pub const I2S_FRAME_BITS: u32 = 64;

const AUTO_INCREMENTS: [u32; 16] = [
    0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 40, 80, 160, 320, 640,
];

const ISR_VSYNC: u8 = 0x01;
const AUDIO_CTRL_RESET: u8 = 0x80;
const AUDIO_FIFO_FULL: u8 = 0x80;
const AUDIO_FIFO_EMPTY: u8 = 0x40;

/// One bus transaction committed by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusTransaction {
    /// Pixel clock at which chip-select was released.
    pub tick: u64,
    /// Register index.
    pub reg: u8,
    /// Byte written or read.
    pub data: u8,
    /// True for reads.
    pub read: bool,
}

/// Behavioral model of the chip's external pins.
#[derive(Debug, Clone)]
pub struct ReferenceChip {
    timing: VideoTiming,
    clk: bool,
    prev_clk: bool,
    tick: u64,
    h: u32,
    v: u32,
    regs: [u8; REGISTER_COUNT],
    vram: Vec<u8>,
    bus: BusLines,
    selected: Option<BusTransaction>,
    video: VideoOut,
    audio: AudioOut,
    audio_tick: u32,
    audio_word: i32,
    fifo: VecDeque<u8>,
    committed: u64,
    transactions: Option<Vec<BusTransaction>>,
    finished: bool,
}

impl ReferenceChip {
    /// Powers up the model with blank VRAM, scanning from the first visible pixel.
    #[must_use]
    pub fn new(timing: VideoTiming) -> Self {
        let mut chip = Self {
            timing,
            clk: false,
            prev_clk: false,
            tick: 0,
            h: 0,
            v: 0,
            regs: [0; REGISTER_COUNT],
            vram: vec![0; VRAM_SIZE],
            bus: BusLines::default(),
            selected: None,
            video: VideoOut::default(),
            audio: AudioOut::default(),
            audio_tick: 0,
            audio_word: 0,
            fifo: VecDeque::new(),
            committed: 0,
            transactions: None,
            finished: false,
        };
        chip.video = chip.scan_out();
        chip
    }

    /// Keeps every committed bus transaction for [`Self::transactions`].
    /// The log grows with each transaction, so long runs leave it off.
    #[must_use]
    pub fn with_transaction_log(mut self) -> Self {
        self.transactions = Some(Vec::new());
        self
    }

    /// Every committed bus transaction in order; empty unless the log was
    /// enabled with [`Self::with_transaction_log`].
    #[must_use]
    pub fn transactions(&self) -> &[BusTransaction] {
        self.transactions.as_deref().unwrap_or(&[])
    }

    /// Bus transactions committed so far, logged or not.
    #[must_use]
    pub const fn committed(&self) -> u64 {
        self.committed
    }

    /// Raw register file contents.
    #[must_use]
    pub const fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.regs
    }

    /// VRAM contents.
    #[must_use]
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// Current VRAM address including bit 16.
    #[must_use]
    pub fn vram_address(&self) -> u32 {
        (u32::from(self.regs[usize::from(ADDR_H)] & 0x01) << 16)
            | (u32::from(self.regs[usize::from(ADDR_M)]) << 8)
            | u32::from(self.regs[usize::from(ADDR_L)])
    }

    /// Bytes waiting in the audio FIFO.
    #[must_use]
    pub fn audio_fifo_len(&self) -> usize {
        self.fifo.len()
    }

    /// Pixel clocks elapsed.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    fn set_vram_address(&mut self, addr: u32) {
        let addr = addr & VRAM_ADDR_MASK;
        let [lo, mid, hi, _] = addr.to_le_bytes();
        self.regs[usize::from(ADDR_L)] = lo;
        self.regs[usize::from(ADDR_M)] = mid;
        let h = &mut self.regs[usize::from(ADDR_H)];
        *h = (*h & 0xFE) | (hi & 0x01);
    }

    fn advance_vram_address(&mut self) {
        let step = AUTO_INCREMENTS[usize::from(self.regs[usize::from(ADDR_H)] >> 4)];
        if step != 0 {
            self.set_vram_address(self.vram_address() + step);
        }
    }

    fn peek(&self, reg: u8) -> u8 {
        match reg {
            DATA0 | DATA1 => self.vram[self.vram_address() as usize % VRAM_SIZE],
            AUDIO_CTRL => {
                let mut status = self.regs[usize::from(AUDIO_CTRL)] & 0x3F;
                if self.fifo.len() >= AUDIO_FIFO_DEPTH {
                    status |= AUDIO_FIFO_FULL;
                }
                if self.fifo.is_empty() {
                    status |= AUDIO_FIFO_EMPTY;
                }
                status
            }
            _ => self.regs[usize::from(reg & REGISTER_MASK)],
        }
    }

    fn commit(&mut self, transaction: BusTransaction) {
        let BusTransaction { reg, data, read, .. } = transaction;
        if read {
            if matches!(reg, DATA0 | DATA1) {
                self.advance_vram_address();
            }
        } else {
            match reg {
                DATA0 | DATA1 => {
                    let addr = self.vram_address() as usize % VRAM_SIZE;
                    self.vram[addr] = data;
                    self.advance_vram_address();
                }
                ISR => self.regs[usize::from(ISR)] &= !data,
                AUDIO_CTRL => {
                    if data & AUDIO_CTRL_RESET != 0 {
                        self.fifo.clear();
                    }
                    self.regs[usize::from(AUDIO_CTRL)] = data & 0x3F;
                }
                AUDIO_DATA => {
                    if self.fifo.len() < AUDIO_FIFO_DEPTH {
                        self.fifo.push_back(data);
                    }
                }
                _ => self.regs[usize::from(reg & REGISTER_MASK)] = data,
            }
        }
        self.committed += 1;
        if let Some(entries) = self.transactions.as_mut() {
            entries.push(transaction);
        }
    }

    fn update_bus(&mut self) {
        let read = self.bus.read_active();
        let active = self.bus.write_active() || read;
        if active {
            let reg = self.bus.addr & REGISTER_MASK;
            if read {
                self.bus.data_out = self.peek(reg);
            }
            self.selected = Some(BusTransaction {
                tick: self.tick,
                reg,
                data: if read { self.bus.data_out } else { self.bus.data_in },
                read,
            });
        } else if let Some(mut transaction) = self.selected.take() {
            transaction.tick = self.tick;
            self.commit(transaction);
        }
    }

    fn scan_out(&self) -> VideoOut {
        let t = &self.timing;
        let h_sync_start = t.visible_width + t.h_front_porch;
        let v_sync_start = t.visible_height + t.v_front_porch;
        let h_active = (h_sync_start..h_sync_start + t.h_sync_pulse).contains(&self.h);
        let v_active = (v_sync_start..v_sync_start + t.v_sync_pulse).contains(&self.v);
        let mut out = VideoOut {
            hsync: h_active == t.h_sync_active_high,
            vsync: v_active == t.v_sync_active_high,
            ..VideoOut::default()
        };
        if self.h < t.visible_width && self.v < t.visible_height {
            let offset = (self.v * t.visible_width + self.h) as usize % VRAM_SIZE;
            let gray = self.vram[offset] & 0x0F;
            out.red = gray;
            out.green = gray;
            out.blue = gray;
        }
        out
    }

    fn serialize_audio(&mut self) {
        let frame_ticks = I2S_BIT_TICKS * I2S_FRAME_BITS;
        let half_ticks = frame_ticks / 2;
        let phase = self.audio_tick;
        if phase == 0 {
            self.audio_word = self
                .fifo
                .pop_front()
                .map_or(0, |byte| i32::from(i8::from_ne_bytes([byte])) << 16);
        }
        let bit = (phase % half_ticks) / I2S_BIT_TICKS;
        let data = bit < 24 && (self.audio_word >> (23 - bit)) & 1 != 0;
        self.audio = AudioOut {
            bck: phase % I2S_BIT_TICKS >= I2S_BIT_TICKS / 2,
            lrck: phase >= half_ticks,
            data,
        };
        self.audio_tick = (phase + 1) % frame_ticks;
    }

    fn advance_pixel(&mut self) {
        self.tick += 1;
        self.h += 1;
        if self.h >= self.timing.total_width() {
            self.h = 0;
            self.v += 1;
            if self.v >= self.timing.total_height() {
                self.v = 0;
            }
            if self.v == self.timing.visible_height {
                self.regs[usize::from(ISR)] |= ISR_VSYNC;
            }
        }
        self.video = self.scan_out();
        self.serialize_audio();
    }
}

impl Chip for ReferenceChip {
    fn set_clock(&mut self, high: bool) {
        self.clk = high;
    }

    fn eval(&mut self) {
        if self.clk && !self.prev_clk {
            self.advance_pixel();
        }
        self.prev_clk = self.clk;
        self.update_bus();
    }

    fn bus(&self) -> &BusLines {
        &self.bus
    }

    fn bus_mut(&mut self) -> &mut BusLines {
        &mut self.bus
    }

    fn video(&self) -> VideoOut {
        self.video
    }

    fn audio(&self) -> AudioOut {
        self.audio
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        if let Some(transaction) = self.selected.take() {
            self.commit(transaction);
        }
        self.finished = true;
        log::debug!(
            "reference chip finished after {} ticks, {} bus transactions",
            self.tick,
            self.committed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferenceChip, VRAM_SIZE};
    use crate::chip::{BusLines, Chip};
    use crate::config::VideoTiming;
    use crate::regs::{ADDR_H, ADDR_L, AUDIO_DATA, DATA0};

    fn write(chip: &mut ReferenceChip, reg: u8, data: u8) {
        *chip.bus_mut() = BusLines {
            cs_n: false,
            wr_n: false,
            addr: reg,
            data_in: data,
            ..BusLines::default()
        };
        chip.eval();
        chip.bus_mut().cs_n = true;
        chip.bus_mut().wr_n = true;
        chip.eval();
    }

    fn read(chip: &mut ReferenceChip, reg: u8) -> u8 {
        *chip.bus_mut() = BusLines {
            cs_n: false,
            rd_n: false,
            addr: reg,
            ..BusLines::default()
        };
        chip.eval();
        let value = chip.bus().data_out;
        chip.bus_mut().cs_n = true;
        chip.bus_mut().rd_n = true;
        chip.eval();
        value
    }

    #[test]
    fn data_port_auto_increments() {
        let mut chip = ReferenceChip::new(VideoTiming::default()).with_transaction_log();
        write(&mut chip, ADDR_L, 0x10);
        write(&mut chip, ADDR_H, 0x10);
        write(&mut chip, DATA0, 0xAA);
        write(&mut chip, DATA0, 0xBB);
        assert_eq!(&chip.vram()[0x10..0x12], &[0xAA, 0xBB]);
        assert_eq!(chip.vram_address(), 0x12);

        write(&mut chip, ADDR_L, 0x10);
        assert_eq!(read(&mut chip, DATA0), 0xAA);
        assert_eq!(read(&mut chip, DATA0), 0xBB);
        assert_eq!(chip.transactions().len(), 7);
    }

    #[test]
    fn transaction_log_is_opt_in() {
        let mut chip = ReferenceChip::new(VideoTiming::default());
        for value in 0..100 {
            write(&mut chip, DATA0, value);
        }
        assert_eq!(chip.committed(), 100);
        assert!(chip.transactions().is_empty());
    }

    #[test]
    fn zero_increment_keeps_address() {
        let mut chip = ReferenceChip::new(VideoTiming::default());
        write(&mut chip, ADDR_L, 0x20);
        write(&mut chip, DATA0, 1);
        write(&mut chip, DATA0, 2);
        assert_eq!(chip.vram()[0x20], 2);
        assert_eq!(chip.vram_address(), 0x20);
        assert_eq!(chip.vram().len(), VRAM_SIZE);
    }

    #[test]
    fn sync_pulses_follow_timing() {
        let timing = VideoTiming::default();
        let mut chip = ReferenceChip::new(timing);
        let mut low_ticks = 0;
        for _ in 0..timing.total_width() {
            chip.set_clock(true);
            chip.eval();
            chip.set_clock(false);
            chip.eval();
            if !chip.video().hsync {
                low_ticks += 1;
            }
        }
        assert_eq!(low_ticks, timing.h_sync_pulse);
    }

    #[test]
    fn audio_fifo_accepts_bytes() {
        let mut chip = ReferenceChip::new(VideoTiming::default());
        write(&mut chip, AUDIO_DATA, 0x40);
        write(&mut chip, AUDIO_DATA, 0xC0);
        assert_eq!(chip.audio_fifo_len(), 2);
    }
}
