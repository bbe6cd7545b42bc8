//! Common types and utilities shared by the pipeline crates
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Interleaved 8-bit RGB frame flowing between pipeline nodes
pub type Frame = image::RgbImage;

/// Frame handed to several consumers within one tick
pub type SharedFrame = Arc<Frame>;

/// Message used when two frames cannot be compared
pub const SHAPE_MISMATCH_MESSAGE: &str = "frames must be the same size for metric comparison";

/// Handle to a whole video resource on disk (raw planar 4:2:0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResource {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoResource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            fps,
        }
    }

    /// Build a handle from a file whose name follows the raw planar convention
    ///
    /// `fallback_fps` is used when the name carries no frame rate.
    #[must_use]
    pub fn from_raw_name(path: impl Into<PathBuf>, fallback_fps: f64) -> Option<Self> {
        let path = path.into();
        let name = RawVideoName::parse(&path)?;
        Some(Self {
            width: name.width,
            height: name.height,
            fps: name.fps.unwrap_or(fallback_fps),
            path,
        })
    }

    /// File stem, used to name derived artifacts
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video")
            .to_string()
    }
}

/// Geometry encoded in a raw planar file name: `*_{width}x{height}[_{fps}].yuv`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVideoName {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

impl RawVideoName {
    /// Parse a path; `None` when the name does not follow the convention
    #[must_use]
    pub fn parse(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if !ext.eq_ignore_ascii_case("yuv") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let mut parts = stem.rsplit('_');
        let last = parts.next()?;

        if let Some((width, height)) = parse_dimensions(last) {
            // A bare `{w}x{h}` stem has no prefix to carry the underscore
            parts.next()?;
            return Some(Self {
                width,
                height,
                fps: None,
            });
        }

        let fps: f64 = last.parse().ok().filter(|f: &f64| *f > 0.0)?;
        let (width, height) = parse_dimensions(parts.next()?)?;
        parts.next()?;
        Some(Self {
            width,
            height,
            fps: Some(fps),
        })
    }
}

fn parse_dimensions(segment: &str) -> Option<(u32, u32)> {
    let (w, h) = segment.split_once('x')?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Per-frame-pair comparison result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MetricRecord {
    /// Frames were not comparable
    Message { message: String },
    /// Numeric comparison
    Ok { psnr: f64, ssim: f64 },
}

impl MetricRecord {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        MetricRecord::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, MetricRecord::Ok { .. })
    }
}
