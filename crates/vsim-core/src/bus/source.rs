//! Byte streams feeding array- and file-backed commands, and the read capture
//! file behind `RegReadFile`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sequential byte supply for write commands.
pub trait ByteSource {
    /// Next byte, or `None` once the source is exhausted.
    fn next_byte(&mut self) -> Option<u8>;

    /// Moves the cursor back to the first byte.
    fn rewind(&mut self);
}

/// In-memory source over a shared buffer.
#[derive(Debug, Clone)]
pub struct SliceSource {
    bytes: Arc<[u8]>,
    cursor: usize,
}

impl SliceSource {
    /// Starts at the first byte of `bytes`.
    #[must_use]
    pub const fn new(bytes: Arc<[u8]>) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Index of the next byte.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }
}

impl ByteSource for SliceSource {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// File-backed source, opened on the first read.
///
/// Open or read failures are logged once and the source then reads as
/// exhausted.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    failed: bool,
}

impl FileSource {
    /// Creates a source for `path` without touching the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            failed: false,
        }
    }

    /// Path the bytes come from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&mut self) -> Option<&mut BufReader<File>> {
        if self.failed {
            return None;
        }
        if self.reader.is_none() {
            match File::open(&self.path) {
                Ok(file) => self.reader = Some(BufReader::new(file)),
                Err(err) => {
                    self.fail("open", &err);
                    return None;
                }
            }
        }
        self.reader.as_mut()
    }

    fn fail(&mut self, what: &str, err: &io::Error) {
        log::warn!("cannot {what} {}: {err}", self.path.display());
        self.failed = true;
        self.reader = None;
    }
}

impl ByteSource for FileSource {
    fn next_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        let result = self.reader()?.read(&mut byte);
        match result {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(err) => {
                self.fail("read", &err);
                None
            }
        }
    }

    fn rewind(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            if let Err(err) = reader.seek(SeekFrom::Start(0)) {
                self.fail("rewind", &err);
            }
        }
    }
}

/// Destination file for bytes captured by `RegReadFile`, created on first use.
#[derive(Debug)]
pub struct ReadCapture {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    failed: bool,
}

impl ReadCapture {
    /// Creates a capture for `path` without touching the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            failed: false,
        }
    }

    /// Appends one byte; failures are logged once and later bytes dropped.
    pub fn push(&mut self, byte: u8) {
        if self.failed {
            return;
        }
        if self.writer.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(err) => {
                    log::warn!("cannot create {}: {err}", self.path.display());
                    self.failed = true;
                    return;
                }
            }
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.write_all(&[byte]) {
                log::warn!("cannot write {}: {err}", self.path.display());
                self.failed = true;
                self.writer = None;
            }
        }
    }

    /// Flushes buffered bytes to disk.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                log::warn!("cannot flush {}: {err}", self.path.display());
            }
        }
    }
}

impl Drop for ReadCapture {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::{ByteSource, FileSource, ReadCapture, SliceSource};

    #[test]
    fn slice_source_exhausts_then_rewinds() {
        let mut source = SliceSource::new(Arc::from(vec![1u8, 2]));
        assert_eq!(source.next_byte(), Some(1));
        assert_eq!(source.next_byte(), Some(2));
        assert_eq!(source.next_byte(), None);
        source.rewind();
        assert_eq!(source.cursor(), 0);
        assert_eq!(source.next_byte(), Some(1));
    }

    #[test]
    fn file_source_streams_and_rewinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.bin");
        fs::write(&path, [0xAA, 0xBB]).expect("write payload");

        let mut source = FileSource::new(&path);
        assert_eq!(source.next_byte(), Some(0xAA));
        assert_eq!(source.next_byte(), Some(0xBB));
        assert_eq!(source.next_byte(), None);
        source.rewind();
        assert_eq!(source.next_byte(), Some(0xAA));
    }

    #[test]
    fn missing_file_reads_as_exhausted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = FileSource::new(dir.path().join("absent.bin"));
        assert_eq!(source.next_byte(), None);
        source.rewind();
        assert_eq!(source.next_byte(), None);
    }

    #[test]
    fn read_capture_appends_bytes_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reads.bin");
        {
            let mut capture = ReadCapture::new(&path);
            capture.push(0x10);
            capture.push(0x20);
        }
        assert_eq!(fs::read(&path).expect("read back"), vec![0x10, 0x20]);
        {
            let mut capture = ReadCapture::new(&path);
            capture.push(0x30);
        }
        assert_eq!(fs::read(&path).expect("read back"), vec![0x10, 0x20, 0x30]);
    }
}
