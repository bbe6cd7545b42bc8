//! Pipeline core: module descriptors, graph validation and frame-synchronous execution
//!
//! A request names modules by class and wires them through their `source`
//! lists. [`PipelineGraph::build`] validates the wiring and parameters against
//! a [`ModuleRegistry`]; [`Composer::run`] drives the graph one tick at a time
//! and writes the left, right and interleaved artifacts plus per-tick metrics.

pub mod cache;
pub mod composer;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod graph;
pub mod module;
pub mod params;
pub mod registry;
pub mod request;
pub mod writer;

pub use cache::FrameCache;
pub use composer::{Composer, Lane, PipelineOutcome, SidePlan, PATH_PARAM, VIDEO_PLAYER_PARAM};
pub use config::{ConfigError, PipelineConfig, CONFIG_ENV};
pub use context::ModuleContext;
pub use descriptor::{
    Constraint, FormatDescriptor, ModuleDescriptor, ModuleDescriptorBuilder, ParamType,
    ParameterDefinition, Role, PARAM_REF_PREFIX,
};
pub use error::{
    DescriptorError, GraphError, ModuleError, ParameterError, PipelineError, RegistryError,
};
pub use executor::{PipelineRun, TickOutput};
pub use graph::{PipelineGraph, PipelineNode};
pub use module::{
    FrameModule, FrameStream, ModuleImpl, RegisteredModule, ResourceModule, SinkModule,
    SourceModule, SourceStream,
};
pub use params::{bind, BoundParams, ParamValue};
pub use registry::ModuleRegistry;
pub use request::{ModuleSpec, ParameterEntry, PipelineRequest, PipelineResponse};
pub use writer::{artifact_file_name, Artifact, ArtifactWriter};
