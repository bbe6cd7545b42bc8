//! `blur`: gaussian, median or bilateral smoothing

use image::{imageops, Rgb};
use imageproc::filter::median_filter;
use video_pipeline_common::Frame;
use video_pipeline_core::{
    BoundParams, DescriptorError, FormatDescriptor, FrameModule, ModuleDescriptor, ModuleError,
    ParameterDefinition, Role,
};

pub const ID: &str = "blur";

const METHODS: [&str; 3] = ["gaussian", "median", "bilateral"];

/// Color and spatial sigma of the bilateral filter
const BILATERAL_SIGMA: f32 = 75.0;

pub(crate) fn descriptor() -> Result<ModuleDescriptor, DescriptorError> {
    let rgb = FormatDescriptor::new()
        .field("pixel_format", "rgb24")
        .field("color_space", "bt601_full");
    ModuleDescriptor::builder(ID, Role::Transform)
        .description("Smooths each frame with a square kernel")
        .parameter(
            ParameterDefinition::int("kernel_size")
                .range(1.0, 31.0)
                .with_default(5)
                .describe("Kernel side in pixels; even sizes are rounded up"),
        )
        .parameter(ParameterDefinition::select("method", &METHODS).with_default("gaussian"))
        .input_format(rgb.clone())
        .output_format(rgb)
        .build()
}

/// Kernel side actually applied: even sizes become the next odd size
#[must_use]
pub fn effective_kernel(requested: i64) -> u32 {
    let k = requested.clamp(1, 31) as u32;
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Gaussian sigma implied by a kernel size (the usual `0.3*((k-1)/2-1)+0.8`)
#[must_use]
pub fn gaussian_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[derive(Debug, Default)]
pub struct Blur;

impl FrameModule for Blur {
    fn process_frame(&self, inputs: &[&Frame], params: &BoundParams) -> Result<Frame, ModuleError> {
        let frame: &Frame = inputs
            .first()
            .copied()
            .ok_or_else(|| ModuleError::InvalidInput("blur needs one input frame".to_string()))?;
        let kernel = effective_kernel(params.get_int("kernel_size").unwrap_or(5));
        if kernel == 1 {
            return Ok(frame.clone());
        }
        match params.get_str("method").unwrap_or("gaussian") {
            "gaussian" => Ok(imageops::blur(frame, gaussian_sigma(kernel))),
            "median" => Ok(median_filter(frame, kernel / 2, kernel / 2)),
            "bilateral" => Ok(bilateral(frame, kernel / 2, BILATERAL_SIGMA, BILATERAL_SIGMA)),
            other => Err(ModuleError::InvalidInput(format!(
                "unsupported blur method: {other}"
            ))),
        }
    }
}

/// Edge-preserving smoothing over a `(2r+1)²` window with replicated borders
///
/// The range weight uses the L1 distance over the three channels.
fn bilateral(frame: &Frame, radius: u32, sigma_color: f32, sigma_space: f32) -> Frame {
    let (width, height) = frame.dimensions();
    let r = radius as i64;
    let side = (2 * radius + 1) as usize;

    let mut spatial = vec![0.0_f32; side * side];
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            spatial[((dy + r) as usize) * side + (dx + r) as usize] =
                (-d2 / (2.0 * sigma_space * sigma_space)).exp();
        }
    }
    let color: Vec<f32> = (0..=255 * 3)
        .map(|d| {
            let d = d as f32;
            (-d * d / (2.0 * sigma_color * sigma_color)).exp()
        })
        .collect();

    let clamp_x = |x: i64| x.clamp(0, i64::from(width) - 1) as u32;
    let clamp_y = |y: i64| y.clamp(0, i64::from(height) - 1) as u32;

    Frame::from_fn(width, height, |x, y| {
        let center = frame.get_pixel(x, y).0;
        let mut sum = [0.0_f32; 3];
        let mut norm = 0.0_f32;
        for dy in -r..=r {
            for dx in -r..=r {
                let p = frame
                    .get_pixel(clamp_x(i64::from(x) + dx), clamp_y(i64::from(y) + dy))
                    .0;
                let dist: usize = (0..3)
                    .map(|c| usize::from(p[c].abs_diff(center[c])))
                    .sum();
                let w = spatial[((dy + r) as usize) * side + (dx + r) as usize] * color[dist];
                for c in 0..3 {
                    sum[c] += w * f32::from(p[c]);
                }
                norm += w;
            }
        }
        Rgb(sum.map(|s| (s / norm).round().clamp(0.0, 255.0) as u8))
    })
}
