//! Streaming VCD waveform writer for pin snapshots.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::chip::PinSnapshot;

struct Signal {
    name: &'static str,
    width: u32,
}

const SIGNALS: [Signal; 15] = [
    Signal { name: "clk", width: 1 },
    Signal { name: "extbus_cs_n", width: 1 },
    Signal { name: "extbus_rd_n", width: 1 },
    Signal { name: "extbus_wr_n", width: 1 },
    Signal { name: "extbus_a", width: 5 },
    Signal { name: "extbus_d_in", width: 8 },
    Signal { name: "extbus_d_out", width: 8 },
    Signal { name: "vga_hsync", width: 1 },
    Signal { name: "vga_vsync", width: 1 },
    Signal { name: "vga_r", width: 4 },
    Signal { name: "vga_g", width: 4 },
    Signal { name: "vga_b", width: 4 },
    Signal { name: "audio_bck", width: 1 },
    Signal { name: "audio_lrck", width: 1 },
    Signal { name: "audio_data", width: 1 },
];

const TRACED: usize = SIGNALS.len();

fn values(snap: &PinSnapshot) -> [u64; TRACED] {
    [
        u64::from(snap.clk),
        u64::from(snap.bus.cs_n),
        u64::from(snap.bus.rd_n),
        u64::from(snap.bus.wr_n),
        u64::from(snap.bus.addr),
        u64::from(snap.bus.data_in),
        u64::from(snap.bus.data_out),
        u64::from(snap.video.hsync),
        u64::from(snap.video.vsync),
        u64::from(snap.video.red),
        u64::from(snap.video.green),
        u64::from(snap.video.blue),
        u64::from(snap.audio.bck),
        u64::from(snap.audio.lrck),
        u64::from(snap.audio.data),
    ]
}

/// VCD identifier for signal `idx`: printable ASCII from `!`.
fn vcd_id(idx: usize) -> char {
    let offset = u8::try_from(idx).map_or(b'~', |idx| b'!'.saturating_add(idx));
    char::from(offset)
}

fn format_value(out: &mut String, value: u64, width: u32, id: char) {
    if width == 1 {
        let _ = writeln!(out, "{}{id}", value & 1);
    } else {
        let width = width as usize;
        let _ = writeln!(out, "b{value:0width$b} {id}");
    }
}

/// Writes value changes of every traced pin, one timestamp per half tick.
pub struct VcdWriter<W: Write> {
    out: W,
    prev: Option<[u64; TRACED]>,
    half_period_ps: u64,
    buf: String,
}

impl<W: Write> std::fmt::Debug for VcdWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcdWriter")
            .field("half_period_ps", &self.half_period_ps)
            .finish_non_exhaustive()
    }
}

impl<W: Write> VcdWriter<W> {
    /// Writes the header for a clock of `pixel_clock_khz`.
    ///
    /// # Errors
    ///
    /// Propagates write failures of `out`.
    pub fn new(mut out: W, pixel_clock_khz: u32) -> io::Result<Self> {
        let mut header = String::new();
        header.push_str("$version vera-vsim $end\n");
        header.push_str("$timescale 1ps $end\n");
        header.push_str("$scope module top $end\n");
        for (idx, signal) in SIGNALS.iter().enumerate() {
            let _ = writeln!(
                header,
                "$var wire {} {} {} $end",
                signal.width,
                vcd_id(idx),
                signal.name
            );
        }
        header.push_str("$upscope $end\n$enddefinitions $end\n");
        out.write_all(header.as_bytes())?;
        Ok(Self {
            out,
            prev: None,
            half_period_ps: 500_000_000 / u64::from(pixel_clock_khz.max(1)),
            buf: String::new(),
        })
    }

    /// Dumps the changes in `snap` at half-tick `time`.
    ///
    /// # Errors
    ///
    /// Propagates write failures of the underlying writer.
    pub fn dump(&mut self, time: u64, snap: &PinSnapshot) -> io::Result<()> {
        let current = values(snap);
        let stamp = time * self.half_period_ps;
        self.buf.clear();
        match self.prev {
            None => {
                let _ = writeln!(self.buf, "#{stamp}\n$dumpvars");
                for (idx, signal) in SIGNALS.iter().enumerate() {
                    format_value(&mut self.buf, current[idx], signal.width, vcd_id(idx));
                }
                self.buf.push_str("$end\n");
            }
            Some(prev) => {
                for (idx, signal) in SIGNALS.iter().enumerate() {
                    if prev[idx] == current[idx] {
                        continue;
                    }
                    if self.buf.is_empty() {
                        let _ = writeln!(self.buf, "#{stamp}");
                    }
                    format_value(&mut self.buf, current[idx], signal.width, vcd_id(idx));
                }
            }
        }
        self.prev = Some(current);
        if self.buf.is_empty() {
            return Ok(());
        }
        self.out.write_all(self.buf.as_bytes())
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Propagates flush failures of the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::VcdWriter;
    use crate::chip::PinSnapshot;

    #[test]
    fn header_declares_pins_and_changes_only() {
        let mut vcd = VcdWriter::new(Vec::new(), 25_000).expect("header");
        let mut snap = PinSnapshot::default();
        vcd.dump(0, &snap).expect("dump");
        vcd.dump(1, &snap).expect("dump");
        snap.clk = true;
        vcd.dump(2, &snap).expect("dump");
        let text = String::from_utf8(vcd.into_inner()).expect("ascii");

        assert!(text.contains("$timescale 1ps $end"));
        assert!(text.contains("$var wire 5 % extbus_a $end"));
        assert!(text.contains("#0\n$dumpvars\n0!\n"));
        // unchanged snapshot at t=1 writes nothing
        assert!(!text.contains("#20000\n"));
        assert!(text.ends_with("#40000\n1!\n"));
    }
}
