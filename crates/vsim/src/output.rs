//! File sinks for a run: per-frame screenshots, the audio capture and the
//! waveform trace.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use thiserror::Error;
use vsim_core::{FrameEvent, PinSnapshot, SimConfig, SimObserver, StereoSample, VcdWriter};

#[cfg(feature = "window")]
use crate::window::Preview;

/// Audio capture file name inside the log directory.
pub const WAV_FILE_NAME: &str = "vera_vsim.wav";

/// Waveform trace file name inside the log directory.
pub const VCD_FILE_NAME: &str = "vera_vsim.vcd";

/// Failures creating or writing run artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The log directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The log file could not be created.
    #[error("cannot create log file {path}: {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A logger was already installed for this process.
    #[error("a logger is already installed")]
    LoggerInstalled,
    /// A screenshot could not be encoded or written.
    #[error("cannot write screenshot {path}: {source}")]
    Png {
        /// Screenshot path.
        path: PathBuf,
        /// Encoder failure.
        #[source]
        source: png::EncodingError,
    },
    /// The audio capture could not be created or written.
    #[error("cannot write audio capture {path}: {source}")]
    Wav {
        /// Capture path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The waveform trace could not be created or written.
    #[error("cannot write waveform trace {path}: {source}")]
    Vcd {
        /// Trace path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The preview window could not be opened or updated.
    #[cfg(feature = "window")]
    #[error("preview window: {0}")]
    Window(#[from] minifb::Error),
}

/// RGB raster of one full frame, blanking included.
#[derive(Debug)]
pub struct FrameCapture {
    dir: PathBuf,
    width: u32,
    height: u32,
    visible: (u32, u32),
    rgb: Vec<u8>,
}

impl FrameCapture {
    /// Blank raster for the total geometry of `config`, saved under `dir`.
    pub fn new(dir: &Path, config: &SimConfig) -> Self {
        let timing = &config.timing;
        let width = timing.total_width();
        let height = timing.total_height();
        Self {
            dir: dir.to_path_buf(),
            width,
            height,
            visible: (timing.visible_width, timing.visible_height),
            rgb: vec![0; width as usize * height as usize * 3],
        }
    }

    /// Stores one pixel; coordinates outside the raster are dropped.
    pub fn put(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x < self.width && y < self.height {
            let offset = (y as usize * self.width as usize + x as usize) * 3;
            self.rgb[offset..offset + 3].copy_from_slice(&rgb);
        }
    }

    /// Raster width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Raster height in lines.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB bytes, row-major.
    #[allow(clippy::missing_const_for_fn)]
    pub fn pixels(&self) -> &[u8] {
        &self.rgb
    }

    /// Screenshot path for frame `index`.
    pub fn path_for(&self, index: u32) -> PathBuf {
        let (w, h) = self.visible;
        self.dir.join(format!("vera_vsim_{w}x{h}_f{index:02}.png"))
    }

    /// Writes the raster as the screenshot of frame `index` and blanks it.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Png`] when the file cannot be created or encoded.
    pub fn save(&mut self, index: u32) -> Result<PathBuf, OutputError> {
        let path = self.path_for(index);
        self.write_png(&path).map_err(|source| OutputError::Png {
            path: path.clone(),
            source,
        })?;
        self.rgb.fill(0);
        Ok(path)
    }

    fn write_png(&self, path: &Path) -> Result<(), png::EncodingError> {
        let file = File::create(path)?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width(), self.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(self.pixels())?;
        writer.finish()
    }
}

/// Stereo 24-bit PCM WAV capture, created when audio first appears.
///
/// The file carries a plain 44-byte RIFF header whose sizes are patched by
/// [`Self::finish`].
#[derive(Debug)]
pub struct WavRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    samples: u64,
}

/// Bytes before the first sample.
pub const WAV_HEADER_LEN: u64 = 44;

const WAV_CHANNELS: u16 = 2;
const WAV_BITS: u16 = 24;
const WAV_BLOCK_ALIGN: u16 = WAV_CHANNELS * WAV_BITS / 8;

fn write_wav_header(out: &mut impl Write, sample_rate_hz: u32, data_size: u32) -> io::Result<()> {
    // RIFF header
    out.write_all(b"RIFF")?;
    out.write_all(&data_size.saturating_add(36).to_le_bytes())?;
    out.write_all(b"WAVE")?;

    // fmt chunk
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?; // PCM
    out.write_all(&WAV_CHANNELS.to_le_bytes())?;
    out.write_all(&sample_rate_hz.to_le_bytes())?;
    out.write_all(&sample_rate_hz.saturating_mul(u32::from(WAV_BLOCK_ALIGN)).to_le_bytes())?;
    out.write_all(&WAV_BLOCK_ALIGN.to_le_bytes())?;
    out.write_all(&WAV_BITS.to_le_bytes())?;

    // data chunk
    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())
}

impl WavRecorder {
    /// Recorder that will write to `path` once started.
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            samples: 0,
        }
    }

    /// Opens the file at `sample_rate_hz`. Later calls are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Wav`] when the file cannot be created.
    pub fn start(&mut self, sample_rate_hz: u32) -> Result<(), OutputError> {
        if self.writer.is_some() {
            return Ok(());
        }
        let writer = File::create(&self.path)
            .map(BufWriter::new)
            .and_then(|mut writer| {
                write_wav_header(&mut writer, sample_rate_hz, 0)?;
                Ok(writer)
            })
            .map_err(|source| self.error(source))?;
        self.writer = Some(writer);
        log::info!("recording audio to {} at {sample_rate_hz} Hz", self.path.display());
        Ok(())
    }

    /// Appends one stereo frame; does nothing before [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Wav`] when the write fails.
    pub fn push(&mut self, sample: StereoSample) -> Result<(), OutputError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let result = writer.write_all(&sample.to_le_bytes());
        result.map_err(|source| self.error(source))?;
        self.samples += 1;
        Ok(())
    }

    /// Stereo frames written so far.
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Patches the header sizes and closes the file.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Wav`] when finalizing fails.
    pub fn finish(self) -> Result<(), OutputError> {
        let Some(mut writer) = self.writer else {
            return Ok(());
        };
        let data_size =
            u32::try_from(self.samples * u64::from(WAV_BLOCK_ALIGN)).unwrap_or(u32::MAX);
        let result = writer
            .seek(SeekFrom::Start(4))
            .and_then(|_| writer.write_all(&data_size.saturating_add(36).to_le_bytes()))
            .and_then(|()| writer.seek(SeekFrom::Start(WAV_HEADER_LEN - 4)))
            .and_then(|_| writer.write_all(&data_size.to_le_bytes()))
            .and_then(|()| writer.flush());
        result.map_err(|source| OutputError::Wav {
            path: self.path,
            source,
        })
    }

    fn error(&self, source: io::Error) -> OutputError {
        OutputError::Wav {
            path: self.path.clone(),
            source,
        }
    }
}

/// Waveform trace of every traced half tick.
#[derive(Debug)]
pub struct VcdSink {
    path: PathBuf,
    writer: VcdWriter<BufWriter<File>>,
}

impl VcdSink {
    /// Creates the trace file and writes its header.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Vcd`] when the file cannot be created.
    pub fn create(path: PathBuf, pixel_clock_khz: u32) -> Result<Self, OutputError> {
        let writer = File::create(&path)
            .and_then(|file| VcdWriter::new(BufWriter::new(file), pixel_clock_khz));
        match writer {
            Ok(writer) => Ok(Self { path, writer }),
            Err(source) => Err(OutputError::Vcd { path, source }),
        }
    }

    /// Appends the changes in `pins` at `time`.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Vcd`] when the write fails.
    pub fn dump(&mut self, time: u64, pins: &PinSnapshot) -> Result<(), OutputError> {
        self.writer.dump(time, pins).map_err(|source| OutputError::Vcd {
            path: self.path.clone(),
            source,
        })
    }

    /// Flushes buffered changes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Vcd`] when the flush fails.
    pub fn finish(mut self) -> Result<(), OutputError> {
        self.writer.flush().map_err(|source| OutputError::Vcd {
            path: self.path,
            source,
        })
    }
}

/// Routes simulation output to whichever sinks are enabled.
///
/// A sink that fails is logged and dropped; the run carries on without it.
#[derive(Debug)]
pub struct RunOutputs {
    frames: Option<FrameCapture>,
    audio: Option<WavRecorder>,
    trace: Option<VcdSink>,
    #[cfg(feature = "window")]
    preview: Option<Preview>,
    screenshots: Vec<PathBuf>,
}

impl RunOutputs {
    /// Sets up the sinks `config` asks for inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] when the trace file or preview window cannot be
    /// created.
    pub fn create(dir: &Path, config: &SimConfig) -> Result<Self, OutputError> {
        let trace = if config.trace {
            Some(VcdSink::create(
                dir.join(VCD_FILE_NAME),
                config.timing.pixel_clock_khz,
            )?)
        } else {
            None
        };
        let frames = config.render.then(|| FrameCapture::new(dir, config));
        #[cfg(feature = "window")]
        let preview = match &frames {
            Some(frames) => Some(Preview::open(frames.width(), frames.height())?),
            None => None,
        };
        Ok(Self {
            frames,
            audio: Some(WavRecorder::new(dir.join(WAV_FILE_NAME))),
            trace,
            #[cfg(feature = "window")]
            preview,
            screenshots: Vec::new(),
        })
    }

    /// Screenshots written so far.
    #[allow(clippy::missing_const_for_fn)]
    pub fn screenshots(&self) -> &[PathBuf] {
        &self.screenshots
    }

    /// Closes every remaining sink.
    ///
    /// # Errors
    ///
    /// Returns the first failure; later sinks are still closed.
    pub fn finish(self) -> Result<(), OutputError> {
        let audio = self.audio.map_or(Ok(()), |audio| {
            log::debug!("{} stereo frames recorded", audio.samples());
            audio.finish()
        });
        let trace = self.trace.map_or(Ok(()), VcdSink::finish);
        audio.and(trace)
    }
}

fn drop_on_error<T>(sink: &mut Option<T>, result: Result<(), OutputError>) {
    if let Err(err) = result {
        log::error!("{err}; output disabled");
        *sink = None;
    }
}

impl SimObserver for RunOutputs {
    fn on_half_tick(&mut self, time: u64, pins: &PinSnapshot) {
        if let Some(trace) = self.trace.as_mut() {
            let result = trace.dump(time, pins);
            drop_on_error(&mut self.trace, result);
        }
    }

    fn on_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if let Some(frames) = self.frames.as_mut() {
            frames.put(x, y, rgb);
        }
    }

    fn on_frame(&mut self, frame: &FrameEvent) -> ControlFlow<()> {
        let Some(frames) = self.frames.as_mut() else {
            return ControlFlow::Continue(());
        };
        #[cfg(feature = "window")]
        if let Some(preview) = self.preview.as_mut() {
            if preview
                .present(frames.pixels(), frames.width(), frames.height())
                .is_break()
            {
                return ControlFlow::Break(());
            }
        }
        match frames.save(frame.index) {
            Ok(path) => {
                log::debug!("saved {}", path.display());
                self.screenshots.push(path);
            }
            Err(err) => drop_on_error(&mut self.frames, Err(err)),
        }
        ControlFlow::Continue(())
    }

    fn on_audio_start(&mut self, sample_rate_hz: u32) {
        if let Some(audio) = self.audio.as_mut() {
            let result = audio.start(sample_rate_hz);
            drop_on_error(&mut self.audio, result);
        }
    }

    fn on_audio_sample(&mut self, sample: StereoSample) {
        if let Some(audio) = self.audio.as_mut() {
            let result = audio.push(sample);
            drop_on_error(&mut self.audio, result);
        }
    }
}
