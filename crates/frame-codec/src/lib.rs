/// Raw planar 4:2:0 frame codec
///
/// A frame on disk is the full-resolution luma plane followed by two chroma planes
/// sampled at half resolution in both directions. Files carry no header: geometry
/// comes from the file name (see [`video_pipeline_common::RawVideoName`]).
///
/// This module provides:
/// 1. [`FrameGeometry`] / [`PlanarFrame`]: byte layout of a single frame
/// 2. [`PlanarReader`] / [`PlanarWriter`]: streaming access to raw files
/// 3. [`convert`]: conversion between planar frames and interleaved RGB
pub mod convert;

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use video_pipeline_common::Frame;

pub use convert::{planar_to_rgb, rgb_luma, rgb_to_planar};

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid frame geometry: {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("Frame buffer has {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Frame is {actual_width}x{actual_height}, stream is {width}x{height}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame dimensions plus the derived planar layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidGeometry`] when either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Chroma planes round odd dimensions up
    #[must_use]
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    #[must_use]
    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    #[must_use]
    pub fn chroma_len(&self) -> usize {
        self.chroma_width() as usize * self.chroma_height() as usize
    }

    /// Bytes per frame (`width * height * 3 / 2` for even dimensions)
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }
}

/// One frame in planar 4:2:0 layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    geometry: FrameGeometry,
    data: Vec<u8>,
}

impl PlanarFrame {
    /// Wrap a raw buffer
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthMismatch`] when the buffer is not exactly one frame.
    pub fn from_bytes(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self, CodecError> {
        if data.len() != geometry.frame_len() {
            return Err(CodecError::LengthMismatch {
                expected: geometry.frame_len(),
                actual: data.len(),
            });
        }
        Ok(Self { geometry, data })
    }

    #[must_use]
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn y(&self) -> &[u8] {
        &self.data[..self.geometry.luma_len()]
    }

    #[must_use]
    pub fn u(&self) -> &[u8] {
        let start = self.geometry.luma_len();
        &self.data[start..start + self.geometry.chroma_len()]
    }

    #[must_use]
    pub fn v(&self) -> &[u8] {
        let start = self.geometry.luma_len() + self.geometry.chroma_len();
        &self.data[start..]
    }
}

/// Decode one frame's bytes into an interleaved RGB frame
///
/// # Errors
///
/// Returns [`CodecError::LengthMismatch`] when `bytes` is not exactly one frame.
pub fn decode_frame(geometry: FrameGeometry, bytes: &[u8]) -> Result<Frame, CodecError> {
    let planar = PlanarFrame::from_bytes(geometry, bytes.to_vec())?;
    Ok(planar_to_rgb(&planar))
}

/// Encode an interleaved RGB frame into planar bytes
///
/// # Errors
///
/// Returns [`CodecError::InvalidGeometry`] for an empty frame.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    Ok(rgb_to_planar(frame)?.into_bytes())
}

/// Lazily reads consecutive frames from a raw planar stream
///
/// A trailing partial frame marks the end of the stream and is discarded.
pub struct PlanarReader<R: Read> {
    reader: R,
    geometry: FrameGeometry,
    frames_read: u64,
    done: bool,
}

impl PlanarReader<BufReader<File>> {
    /// Open a raw planar file
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be opened.
    pub fn open(path: &Path, geometry: FrameGeometry) -> Result<Self, CodecError> {
        let file = File::open(path)?;
        debug!(
            "Opened planar stream {} ({}x{})",
            path.display(),
            geometry.width,
            geometry.height
        );
        Ok(Self::new(BufReader::new(file), geometry))
    }
}

impl<R: Read> PlanarReader<R> {
    pub fn new(reader: R, geometry: FrameGeometry) -> Self {
        Self {
            reader,
            geometry,
            frames_read: 0,
            done: false,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    #[must_use]
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next planar frame, `Ok(None)` at end of stream
    ///
    /// # Errors
    ///
    /// Propagates IO errors other than interruption.
    pub fn read_planar(&mut self) -> Result<Option<PlanarFrame>, CodecError> {
        if self.done {
            return Ok(None);
        }
        let len = self.geometry.frame_len();
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Err(e.into());
                }
            }
        }
        if filled < len {
            if filled > 0 {
                debug!(
                    "Discarding {} trailing bytes after frame {}",
                    filled, self.frames_read
                );
            }
            self.done = true;
            return Ok(None);
        }
        self.frames_read += 1;
        Ok(Some(PlanarFrame {
            geometry: self.geometry,
            data: buf,
        }))
    }
}

impl<R: Read> Iterator for PlanarReader<R> {
    type Item = Result<Frame, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_planar() {
            Ok(Some(planar)) => Some(Ok(planar_to_rgb(&planar))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Appends frames to a raw planar stream
///
/// The geometry is fixed by the first frame written unless given up front.
pub struct PlanarWriter<W: Write> {
    writer: W,
    geometry: Option<FrameGeometry>,
    frames_written: u64,
}

impl PlanarWriter<BufWriter<File>> {
    /// Create (or truncate) a raw planar file
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, CodecError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> PlanarWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            geometry: None,
            frames_written: 0,
        }
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: FrameGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    #[must_use]
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// # Errors
    ///
    /// Returns [`CodecError::GeometryMismatch`] when the frame differs from the
    /// stream geometry, or an IO error from the underlying writer.
    pub fn write_planar(&mut self, frame: &PlanarFrame) -> Result<(), CodecError> {
        let geometry = *self.geometry.get_or_insert(frame.geometry);
        if geometry != frame.geometry {
            return Err(CodecError::GeometryMismatch {
                width: geometry.width,
                height: geometry.height,
                actual_width: frame.geometry.width,
                actual_height: frame.geometry.height,
            });
        }
        self.writer.write_all(&frame.data)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Convert and append an RGB frame
    ///
    /// # Errors
    ///
    /// Same as [`PlanarWriter::write_planar`].
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        let planar = rgb_to_planar(frame)?;
        self.write_planar(&planar)
    }

    /// Flush buffered bytes and return the number of frames written
    ///
    /// # Errors
    ///
    /// Returns an IO error if the flush fails.
    pub fn finish(mut self) -> Result<u64, CodecError> {
        self.writer.flush()?;
        Ok(self.frames_written)
    }
}
