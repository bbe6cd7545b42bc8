//! Error types for pipeline validation and execution

use crate::descriptor::ParamType;
use serde::Serialize;
use thiserror::Error;
use video_pipeline_codec::CodecError;

/// Structural problems in a submitted graph
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphError {
    #[error("Pipeline has no modules")]
    EmptyPipeline,

    #[error("Duplicate node id: {node}")]
    DuplicateNodeId { node: String },

    #[error("Node '{node}' references unknown module class '{module_class}'")]
    UnknownModule { node: String, module_class: String },

    #[error("Node '{node}' lists unknown upstream '{missing}'")]
    DanglingReference { node: String, missing: String },

    #[error("Cycle detected between nodes: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Pipeline has no source node")]
    MissingSource,

    #[error("Pipeline has more than one source: {}", .nodes.join(", "))]
    MultipleSources { nodes: Vec<String> },

    #[error("Source node '{node}' must not have upstream nodes")]
    SourceHasUpstream { node: String },

    #[error("Node '{node}' has no upstream node")]
    MissingUpstream { node: String },

    #[error("Pipeline has no result node")]
    NoSink,

    #[error("Pipeline has more than two result nodes: {}", .nodes.join(", "))]
    TooManySinks { nodes: Vec<String> },

    #[error("Result node '{node}' must have exactly one upstream node, found {count}")]
    SinkUpstreamCount { node: String, count: usize },

    #[error("Result node '{node}' reads the source directly; add a transform in between")]
    SinkReadsSource { node: String },

    #[error("Result node '{node}' cannot feed node '{dependent}'")]
    SinkHasDependents { node: String, dependent: String },

    #[error("Whole-resource step '{node}' must have exactly one upstream node, found {count}")]
    ResourceUpstreamCount { node: String, count: usize },

    #[error(
        "Whole-resource step '{node}' must read the source or another whole-resource step, not '{upstream}'"
    )]
    ResourceAfterFrameStep { node: String, upstream: String },
}

/// Problems binding request parameters to a module's schema
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterError {
    #[error("Node '{node}': unknown parameter '{key}'")]
    Unknown { node: String, key: String },

    #[error("Node '{node}': parameter '{key}' given more than once")]
    Duplicate { node: String, key: String },

    #[error("Node '{node}': parameter '{key}' expects {expected}, got {found}")]
    TypeMismatch {
        node: String,
        key: String,
        expected: ParamType,
        found: String,
    },

    #[error("Node '{node}': missing required parameter '{key}'")]
    MissingRequired { node: String, key: String },

    #[error("Node '{node}': parameter '{key}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        node: String,
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Node '{node}': parameter '{key}' = '{value}' is not one of {options:?}")]
    InvalidOption {
        node: String,
        key: String,
        value: String,
        options: Vec<String>,
    },
}

/// Malformed module descriptors, caught at construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("Parameter '{0}' is declared twice")]
    DuplicateParameter(String),

    #[error("Select parameter '{0}' has no options")]
    SelectWithoutOptions(String),

    #[error("Parameter '{name}' has an empty range [{min}, {max}]")]
    EmptyRange { name: String, min: f64, max: f64 },

    #[error("Default of parameter '{name}' is invalid: {reason}")]
    InvalidDefault { name: String, reason: String },

    #[error("Format field '{field}' references undeclared parameter '{param}'")]
    UnknownFormatParameter { field: String, param: String },
}

/// Errors raised by module implementations
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Module execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Resource unavailable: {0}")]
    Resource(String),

    #[error("Process '{program}' exited with {status:?}")]
    Process {
        program: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown module class: {0}")]
    UnknownModule(String),

    #[error("Module '{id}' is declared as {declared:?} but implemented as {implemented}")]
    RoleMismatch {
        id: String,
        declared: crate::descriptor::Role,
        implemented: &'static str,
    },
}

/// Top-level error for a pipeline request
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid pipeline graph: {}", join(.0))]
    Graph(Vec<GraphError>),

    #[error("Invalid parameters: {}", join(.0))]
    Parameters(Vec<ParameterError>),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Process '{program}' failed with status {status:?}")]
    Process {
        program: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Node '{node}' failed: {source}")]
    Module {
        node: String,
        #[source]
        source: ModuleError,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    /// Attribute a module failure to the node that raised it
    #[must_use]
    pub fn from_module(node: &str, err: ModuleError) -> Self {
        match err {
            ModuleError::Resource(msg) => PipelineError::Resource(format!("{node}: {msg}")),
            ModuleError::Process {
                program,
                status,
                stdout,
                stderr,
            } => PipelineError::Process {
                program,
                status,
                stdout,
                stderr,
            },
            other => PipelineError::Module {
                node: node.to_string(),
                source: other,
            },
        }
    }

    /// Stable category name used by the HTTP surface
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Graph(_) => "graph",
            PipelineError::Parameters(_) => "parameter",
            PipelineError::Resource(_) => "resource",
            PipelineError::Process { .. } => "process",
            PipelineError::Module { .. } => "module",
            PipelineError::Codec(_) | PipelineError::Io(_) | PipelineError::Internal(_) => {
                "internal"
            }
        }
    }

    /// True for errors raised before any frame is read
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Graph(_) | PipelineError::Parameters(_))
    }
}
