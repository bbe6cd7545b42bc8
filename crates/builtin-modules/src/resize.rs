//! `resize`: scales every frame to a fixed geometry

use image::imageops::{self, FilterType};
use video_pipeline_common::Frame;
use video_pipeline_core::{
    BoundParams, DescriptorError, FormatDescriptor, FrameModule, ModuleDescriptor, ModuleError,
    ParameterDefinition, Role,
};

pub const ID: &str = "resize";

const INTERPOLATIONS: [&str; 5] = ["nearest", "linear", "cubic", "area", "lanczos4"];

pub(crate) fn descriptor() -> Result<ModuleDescriptor, DescriptorError> {
    let rgb = FormatDescriptor::new()
        .field("pixel_format", "rgb24")
        .field("color_space", "bt601_full");
    ModuleDescriptor::builder(ID, Role::Transform)
        .description("Resizes frames to width x height")
        .parameter(ParameterDefinition::int("width").range(32.0, 3840.0).required())
        .parameter(ParameterDefinition::int("height").range(32.0, 2160.0).required())
        .parameter(
            ParameterDefinition::select("interpolation", &INTERPOLATIONS).with_default("linear"),
        )
        .input_format(rgb.clone())
        .output_format(
            rgb.field("width", "param:width")
                .field("height", "param:height"),
        )
        .build()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    /// Pixel-area averaging when shrinking, linear otherwise
    Area,
    Lanczos,
}

impl Interpolation {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "nearest" => Some(Self::Nearest),
            "linear" => Some(Self::Linear),
            "cubic" => Some(Self::Cubic),
            "area" => Some(Self::Area),
            "lanczos4" => Some(Self::Lanczos),
            _ => None,
        }
    }

    fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Linear | Self::Area => FilterType::Triangle,
            Self::Cubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Resize one frame
#[must_use]
pub fn resize_frame(frame: &Frame, width: u32, height: u32, interpolation: Interpolation) -> Frame {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    let shrinking = width <= frame.width() && height <= frame.height();
    if interpolation == Interpolation::Area && shrinking {
        return imageops::thumbnail(frame, width, height);
    }
    imageops::resize(frame, width, height, interpolation.filter())
}

#[derive(Debug, Default)]
pub struct Resize;

impl FrameModule for Resize {
    fn process_frame(&self, inputs: &[&Frame], params: &BoundParams) -> Result<Frame, ModuleError> {
        let frame: &Frame = inputs
            .first()
            .copied()
            .ok_or_else(|| ModuleError::InvalidInput("resize needs one input frame".to_string()))?;
        let dimension = |key: &str| {
            params
                .get_int(key)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| ModuleError::InvalidInput(format!("{key} must be a positive integer")))
        };
        let width = dimension("width")?;
        let height = dimension("height")?;
        let method = params.get_str("interpolation").unwrap_or("linear");
        let interpolation = Interpolation::parse(method).ok_or_else(|| {
            ModuleError::InvalidInput(format!("unsupported interpolation: {method}"))
        })?;
        Ok(resize_frame(frame, width, height, interpolation))
    }
}
