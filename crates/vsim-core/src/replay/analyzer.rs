//! Logic-analyzer CSV captures of the host CPU bus.
//!
//! Each row after the header is `time, A15..A0, D7..D0, M7..M0`: a signed
//! sample count followed by 32 single-bit columns, most significant bit
//! first, separated by commas and/or whitespace. The misc byte carries the
//! bus control signals; see [`AnalyzerOptions`] for the bit assignment.
//!
//! Bus state is latched while PHI2 is high and evaluated on its falling edge,
//! which is when the CPU completes the access.

use std::io::BufRead;
use std::path::Path;

use super::{ReplayEvent, ReplayTable, Timebase};
use crate::regs::{REGISTER_MASK, VERA_BASE, VERA_WINDOW_MASK};
use crate::IngestError;

const ADDRESS_BITS: usize = 16;
const DATA_BITS: usize = 8;
const MISC_BITS: usize = 8;
const COLUMNS: usize = 1 + ADDRESS_BITS + DATA_BITS + MISC_BITS;

/// Misc bit carrying PHI2 (first misc column).
pub const MISC_PHI2: u8 = 0x80;
/// Misc bit carrying R/W (high = read).
pub const MISC_RWB: u8 = 0x40;
/// Misc bit carrying active-low reset.
pub const MISC_RESB: u8 = 0x20;

/// Decoding parameters for analyzer captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// Host address of register 0.
    pub base_address: u16,
    /// Mask applied to the address before comparing with `base_address`.
    pub window_mask: u16,
    /// Sample-count to bus-cycle conversion.
    pub timebase: Timebase,
    /// PHI2 bit in the misc byte.
    pub phi2_mask: u8,
    /// R/W bit in the misc byte.
    pub rwb_mask: u8,
    /// Reset bit in the misc byte.
    pub resb_mask: u8,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            base_address: VERA_BASE,
            window_mask: VERA_WINDOW_MASK,
            timebase: Timebase::default(),
            phi2_mask: MISC_PHI2,
            rwb_mask: MISC_RWB,
            resb_mask: MISC_RESB,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BusSample {
    addr: u16,
    data: u8,
    misc: u8,
}

/// Parses an analyzer capture into a replay table of register writes.
///
/// # Errors
///
/// Any malformed row aborts with [`IngestError`]; a capture without qualifying
/// writes yields [`IngestError::Empty`].
pub fn parse_analyzer_csv<R: BufRead>(
    reader: R,
    path: &Path,
    options: &AnalyzerOptions,
) -> Result<ReplayTable, IngestError> {
    let mut events = Vec::new();
    let mut origin: Option<i64> = None;
    let mut prev_phi2 = false;
    let mut latched: Option<BusSample> = None;
    let mut reads_skipped = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if idx == 0 || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        if fields.len() != COLUMNS {
            return Err(IngestError::ColumnCount {
                path: path.to_path_buf(),
                line: line_no,
                expected: COLUMNS,
                found: fields.len(),
            });
        }

        let time: i64 = fields[0]
            .parse()
            .map_err(|_| malformed(path, line_no, "time", fields[0]))?;
        let data_start = 1 + ADDRESS_BITS;
        let misc_start = data_start + DATA_BITS;
        let addr = pack_bits(&fields[1..data_start], path, line_no, "address")?;
        let data = pack_bits(&fields[data_start..misc_start], path, line_no, "data")?;
        let misc = pack_bits(&fields[misc_start..], path, line_no, "misc")?;
        #[allow(clippy::cast_possible_truncation)]
        let sample = BusSample {
            addr: addr as u16,
            data: data as u8,
            misc: misc as u8,
        };

        let origin = *origin.get_or_insert(time);
        let phi2 = sample.misc & options.phi2_mask != 0;

        if sample.misc & options.resb_mask == 0 {
            latched = None;
            prev_phi2 = phi2;
            continue;
        }

        if phi2 {
            latched = Some(sample);
        } else if prev_phi2 {
            if let Some(bus) = latched.take() {
                if bus.addr & options.window_mask == options.base_address {
                    if bus.misc & options.rwb_mask == 0 {
                        let timestamp = u64::try_from(time.saturating_sub(origin)).unwrap_or(0);
                        #[allow(clippy::cast_possible_truncation)]
                        let register = (bus.addr as u8) & REGISTER_MASK;
                        events.push(ReplayEvent::write(timestamp, register, bus.data));
                    } else {
                        reads_skipped += 1;
                    }
                }
            }
        }
        prev_phi2 = phi2;
    }

    if events.is_empty() {
        return Err(IngestError::Empty {
            path: path.to_path_buf(),
        });
    }
    log::debug!(
        "{}: {} register writes, {} reads skipped",
        path.display(),
        events.len(),
        reads_skipped
    );
    Ok(ReplayTable::new(events, options.timebase))
}

fn pack_bits(
    fields: &[&str],
    path: &Path,
    line: usize,
    name: &'static str,
) -> Result<u32, IngestError> {
    fields.iter().try_fold(0u32, |acc, field| match *field {
        "0" => Ok(acc << 1),
        "1" => Ok((acc << 1) | 1),
        other => Err(malformed(path, line, name, other)),
    })
}

fn malformed(path: &Path, line: usize, field: &'static str, text: &str) -> IngestError {
    IngestError::MalformedField {
        path: path.to_path_buf(),
        line,
        field,
        text: text.to_string(),
    }
}
