//! `result`: terminal node feeding one side of the player

use video_pipeline_core::{
    DescriptorError, FormatDescriptor, ModuleDescriptor, ParameterDefinition, Role, SinkModule,
    PATH_PARAM, VIDEO_PLAYER_PARAM,
};

pub const ID: &str = "result";

pub(crate) fn descriptor() -> Result<ModuleDescriptor, DescriptorError> {
    ModuleDescriptor::builder(ID, Role::Sink)
        .description("Writes its upstream frames to a raw planar artifact")
        .parameter(
            ParameterDefinition::select(VIDEO_PLAYER_PARAM, &["left", "right"])
                .describe("Player side; defaults to submission order"),
        )
        .parameter(
            ParameterDefinition::string(PATH_PARAM).describe("Prefix for the artifact file name"),
        )
        .input_format(FormatDescriptor::new().field("pixel_format", "rgb24"))
        .output_format(FormatDescriptor::yuv420p())
        .build()
}

/// The artifact is final as written
#[derive(Debug, Default)]
pub struct ResultSink;

impl SinkModule for ResultSink {}
