//! Frame-pair quality metrics (PSNR / SSIM)
//!
//! Comparisons never fail: anything that prevents a numeric result degrades into
//! a [`MetricRecord::Message`] so that a pipeline run keeps going.
//!
//! # Example
//! ```no_run
//! use video_pipeline_common::Frame;
//! use video_pipeline_metrics::compute_metrics;
//!
//! let a = Frame::new(64, 48);
//! let record = compute_metrics(&a, &a);
//! assert!(record.is_ok());
//! ```

pub mod ssim;

use ndarray::Array2;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use video_pipeline_codec::{rgb_luma, CodecError, FrameGeometry, PlanarReader};
use video_pipeline_common::{Frame, MetricRecord, VideoResource, SHAPE_MISMATCH_MESSAGE};

/// PSNR reported for identical inputs
pub const PSNR_MAX: f64 = 100.0;

/// Message for frames smaller than one SSIM window
pub const TOO_SMALL_MESSAGE: &str = "frames are too small for structural similarity";

/// Errors raised while opening resources for a series comparison
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// PSNR over two equally sized byte buffers
#[must_use]
pub fn psnr(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return PSNR_MAX;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum();
    let mse = sum / a.len() as f64;
    if mse == 0.0 {
        return PSNR_MAX;
    }
    20.0 * (255.0 / mse.sqrt()).log10()
}

fn to_plane(bytes: &[u8], width: u32, height: u32) -> Array2<f64> {
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        f64::from(bytes[y * width as usize + x])
    })
}

fn compare_planes(a: &[u8], b: &[u8], width: u32, height: u32, psnr_value: f64) -> MetricRecord {
    let pa = to_plane(a, width, height);
    let pb = to_plane(b, width, height);
    match ssim::ssim(pa.view(), pb.view()) {
        Some(ssim) => MetricRecord::Ok {
            psnr: psnr_value,
            ssim,
        },
        None => MetricRecord::message(TOO_SMALL_MESSAGE),
    }
}

/// Compare two RGB frames
///
/// PSNR is taken over all channels; SSIM over the luma projection.
#[must_use]
pub fn compute_metrics(a: &Frame, b: &Frame) -> MetricRecord {
    if a.dimensions() != b.dimensions() {
        return MetricRecord::message(SHAPE_MISMATCH_MESSAGE);
    }
    let (width, height) = a.dimensions();
    let psnr_value = psnr(a.as_raw(), b.as_raw());
    compare_planes(&rgb_luma(a), &rgb_luma(b), width, height, psnr_value)
}

fn open_reader(
    video: &VideoResource,
) -> Result<PlanarReader<std::io::BufReader<std::fs::File>>, MetricsError> {
    let wrap = |source| MetricsError::Open {
        path: video.path.clone(),
        source,
    };
    let geometry = FrameGeometry::new(video.width, video.height).map_err(wrap)?;
    PlanarReader::open(&video.path, geometry).map_err(wrap)
}

/// Compare two raw planar files on their luma planes, frame by frame
///
/// Stops at the shorter file, or after `max_frames` pairs.
///
/// # Errors
///
/// Returns an error if either file cannot be opened or read.
pub fn compare_luma_series(
    a: &VideoResource,
    b: &VideoResource,
    max_frames: Option<usize>,
) -> Result<Vec<MetricRecord>, MetricsError> {
    let mut reader_a = open_reader(a)?;
    let mut reader_b = open_reader(b)?;
    let same_shape = a.width == b.width && a.height == b.height;

    let mut records = Vec::new();
    while max_frames.map_or(true, |max| records.len() < max) {
        let (Some(fa), Some(fb)) = (reader_a.read_planar()?, reader_b.read_planar()?) else {
            break;
        };
        let record = if same_shape {
            compare_planes(fa.y(), fb.y(), a.width, a.height, psnr(fa.y(), fb.y()))
        } else {
            MetricRecord::message(SHAPE_MISMATCH_MESSAGE)
        };
        debug!("Luma pair {}: {:?}", records.len(), record);
        records.push(record);
    }

    info!(
        "Compared {} luma frames ({} vs {})",
        records.len(),
        a.path.display(),
        b.path.display()
    );
    Ok(records)
}
