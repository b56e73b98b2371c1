//! Emulator video-write logs: one `timestamp, register, data` line per write.

use std::io::BufRead;
use std::path::Path;

use super::{ReplayEvent, ReplayTable, Timebase};
use crate::regs::{register_for_address, REGISTER_COUNT};
use crate::IngestError;

const FIELDS: usize = 3;

/// Parses a video-write log.
///
/// Numbers are decimal or hex with a `0x` or `$` prefix. The register column
/// takes either an index below 32 or an absolute host address inside the
/// register window. Lines starting with `#` and blank lines are skipped.
///
/// # Errors
///
/// Returns [`IngestError`] for a malformed line, a register outside the
/// window, or a log without entries.
pub fn parse_video_log<R: BufRead>(reader: R, path: &Path) -> Result<ReplayTable, IngestError> {
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        if fields.len() != FIELDS {
            return Err(IngestError::ColumnCount {
                path: path.to_path_buf(),
                line: line_no,
                expected: FIELDS,
                found: fields.len(),
            });
        }

        let field = |index: usize, name: &'static str| {
            parse_number(fields[index]).ok_or_else(|| IngestError::MalformedField {
                path: path.to_path_buf(),
                line: line_no,
                field: name,
                text: fields[index].to_string(),
            })
        };
        let timestamp = field(0, "timestamp")?;
        let register = resolve_register(field(1, "register")?).ok_or_else(|| {
            IngestError::RegisterOutOfRange {
                path: path.to_path_buf(),
                line: line_no,
                value: parse_number(fields[1]).unwrap_or_default(),
            }
        })?;
        let data = u8::try_from(field(2, "data")?).map_err(|_| IngestError::MalformedField {
            path: path.to_path_buf(),
            line: line_no,
            field: "data",
            text: fields[2].to_string(),
        })?;

        events.push(ReplayEvent::write(timestamp, register, data));
    }

    if events.is_empty() {
        return Err(IngestError::Empty {
            path: path.to_path_buf(),
        });
    }
    // Emulators may flush writes out of order across frames.
    events.sort_by_key(|event| event.timestamp);
    Ok(ReplayTable::new(events, Timebase::default()))
}

fn parse_number(text: &str) -> Option<u64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn resolve_register(value: u64) -> Option<u8> {
    if let Ok(index) = u8::try_from(value) {
        if usize::from(index) < REGISTER_COUNT {
            return Some(index);
        }
    }
    u16::try_from(value).ok().and_then(register_for_address)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rstest::rstest;

    use super::{parse_number, parse_video_log};
    use crate::IngestError;

    #[rstest]
    #[case("42", Some(42))]
    #[case("0x2A", Some(42))]
    #[case("$2a", Some(42))]
    #[case("0x", None)]
    #[case("4z", None)]
    fn numbers_accept_decimal_and_hex(#[case] text: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_number(text), expected);
    }

    #[test]
    fn comments_blank_lines_and_absolute_addresses() {
        let text = "# capture\n\n100, 0x05, 0x80\n120 $9F23 7\n";
        let table = parse_video_log(text.as_bytes(), Path::new("v.log")).expect("valid log");
        assert_eq!(table.len(), 2);
        assert_eq!(table.events()[0].register, 0x05);
        assert_eq!(table.events()[1].register, 0x03);
        assert_eq!(table.events()[1].data, 7);
        assert_eq!(table.offset_cycles(1), 20);
    }

    #[test]
    fn register_outside_window_is_rejected() {
        let err = parse_video_log("0, 0x9F40, 1\n".as_bytes(), Path::new("v.log"))
            .expect_err("0x9F40 is outside the window");
        assert!(matches!(
            err,
            IngestError::RegisterOutOfRange {
                line: 1,
                value: 0x9F40,
                ..
            }
        ));
    }

    #[test]
    fn data_wider_than_a_byte_is_malformed() {
        let err = parse_video_log("0, 3, 256\n".as_bytes(), Path::new("v.log"))
            .expect_err("256 does not fit a byte");
        assert!(matches!(err, IngestError::MalformedField { field: "data", .. }));
    }

    #[test]
    fn comment_only_log_is_empty() {
        let err = parse_video_log("# nothing\n".as_bytes(), Path::new("v.log"))
            .expect_err("no entries");
        assert!(matches!(err, IngestError::Empty { .. }));
    }
}
