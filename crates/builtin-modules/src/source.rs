//! `video_source`: decodes a raw planar file from the video directory

use std::path::Path;
use tracing::{debug, info};
use video_pipeline_codec::{FrameGeometry, PlanarReader};
use video_pipeline_common::{RawVideoName, VideoResource};
use video_pipeline_core::{
    BoundParams, DescriptorError, FormatDescriptor, ModuleContext, ModuleDescriptor, ModuleError,
    ParameterDefinition, Role, SourceModule, SourceStream,
};

pub const ID: &str = "video_source";

pub(crate) fn descriptor() -> Result<ModuleDescriptor, DescriptorError> {
    ModuleDescriptor::builder(ID, Role::Source)
        .description("Reads a raw planar 4:2:0 video named *_{width}x{height}[_{fps}].yuv")
        .parameter(
            ParameterDefinition::string("path")
                .required()
                .describe("File name, relative to the video directory, or absolute path"),
        )
        .parameter(
            ParameterDefinition::int("fps")
                .range(1.0, 120.0)
                .with_default(30)
                .describe("Frame rate used when the file name carries none"),
        )
        .output_format(
            FormatDescriptor::new()
                .field("pixel_format", "rgb24")
                .field("color_space", "bt601_full"),
        )
        .build()
}

#[derive(Debug, Default)]
pub struct VideoSource;

impl VideoSource {
    fn resource(path: &Path, params: &BoundParams, ctx: &ModuleContext) -> Result<VideoResource, ModuleError> {
        let name = RawVideoName::parse(path).ok_or_else(|| {
            ModuleError::Resource(format!(
                "{} is not a raw planar file named *_{{width}}x{{height}}[_{{fps}}].yuv",
                path.display()
            ))
        })?;
        let fallback = params
            .get_int("fps")
            .map_or(ctx.default_fps, |fps| fps as f64);
        Ok(VideoResource::new(
            path,
            name.width,
            name.height,
            name.fps.unwrap_or(fallback),
        ))
    }
}

impl SourceModule for VideoSource {
    fn open(&self, params: &BoundParams, ctx: &ModuleContext) -> Result<SourceStream, ModuleError> {
        let locator = params
            .get_str("path")
            .ok_or_else(|| ModuleError::InvalidInput("path is not set".to_string()))?;
        let path = ctx.resolve_video(locator)?;
        if !path.is_file() {
            return Err(ModuleError::Resource(format!(
                "video not found: {}",
                path.display()
            )));
        }
        let resource = Self::resource(&path, params, ctx)?;
        let geometry = FrameGeometry::new(resource.width, resource.height)
            .map_err(|e| ModuleError::Resource(e.to_string()))?;
        let reader = PlanarReader::open(&path, geometry)
            .map_err(|e| ModuleError::Resource(format!("{}: {e}", path.display())))?;

        let frame_len = geometry.frame_len() as u64;
        if let Ok(meta) = std::fs::metadata(&path) {
            debug!(
                "{} holds {} whole frames of {} bytes",
                path.display(),
                meta.len() / frame_len,
                frame_len
            );
        }
        info!(
            "Opened {} ({}x{} @ {} fps)",
            path.display(),
            resource.width,
            resource.height,
            resource.fps
        );
        Ok(SourceStream {
            resource,
            frames: Box::new(reader.map(|frame| frame.map_err(ModuleError::from))),
        })
    }
}
