//! Conversion between interleaved RGB and planar 4:2:0 (BT.601, full range)
//!
//! Chroma is the average of each 2x2 block; edge blocks of odd-sized frames
//! average only the pixels they cover.

use crate::{CodecError, FrameGeometry, PlanarFrame};
use image::Rgb;
use video_pipeline_common::Frame;

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

#[inline]
fn chroma(r: f32, g: f32, b: f32) -> (f32, f32) {
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    (u, v)
}

/// Convert an RGB frame into planar 4:2:0
///
/// # Errors
///
/// Returns [`CodecError::InvalidGeometry`] for a zero-sized frame.
pub fn rgb_to_planar(frame: &Frame) -> Result<PlanarFrame, CodecError> {
    let (width, height) = frame.dimensions();
    let geometry = FrameGeometry::new(width, height)?;
    let mut data = vec![0u8; geometry.frame_len()];

    let (y_plane, chroma_planes) = data.split_at_mut(geometry.luma_len());
    for (i, px) in frame.pixels().enumerate() {
        let [r, g, b] = px.0;
        y_plane[i] = clamp_u8(luma(f32::from(r), f32::from(g), f32::from(b)));
    }

    let (u_plane, v_plane) = chroma_planes.split_at_mut(geometry.chroma_len());
    let cw = geometry.chroma_width();
    for cy in 0..geometry.chroma_height() {
        for cx in 0..cw {
            let mut sum_u = 0.0f32;
            let mut sum_v = 0.0f32;
            let mut n = 0.0f32;
            for y in (cy * 2)..(cy * 2 + 2).min(height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let [r, g, b] = frame.get_pixel(x, y).0;
                    let (u, v) = chroma(f32::from(r), f32::from(g), f32::from(b));
                    sum_u += u;
                    sum_v += v;
                    n += 1.0;
                }
            }
            let idx = (cy * cw + cx) as usize;
            u_plane[idx] = clamp_u8(sum_u / n);
            v_plane[idx] = clamp_u8(sum_v / n);
        }
    }

    PlanarFrame::from_bytes(geometry, data)
}

/// Convert a planar 4:2:0 frame into RGB, upsampling chroma by replication
#[must_use]
pub fn planar_to_rgb(planar: &PlanarFrame) -> Frame {
    let geometry = planar.geometry();
    let (y_plane, u_plane, v_plane) = (planar.y(), planar.u(), planar.v());
    let width = geometry.width;
    let cw = geometry.chroma_width();

    Frame::from_fn(width, geometry.height, |x, y| {
        let luma = f32::from(y_plane[(y * width + x) as usize]);
        let c_idx = ((y / 2) * cw + x / 2) as usize;
        let u = f32::from(u_plane[c_idx]) - 128.0;
        let v = f32::from(v_plane[c_idx]) - 128.0;
        Rgb([
            clamp_u8(luma + 1.402 * v),
            clamp_u8(luma - 0.344_136 * u - 0.714_136 * v),
            clamp_u8(luma + 1.772 * u),
        ])
    })
}

/// Luma projection of an RGB frame, same weights as the planar encoder
#[must_use]
pub fn rgb_luma(frame: &Frame) -> Vec<u8> {
    frame
        .pixels()
        .map(|px| {
            let [r, g, b] = px.0;
            clamp_u8(luma(f32::from(r), f32::from(g), f32::from(b)))
        })
        .collect()
}
