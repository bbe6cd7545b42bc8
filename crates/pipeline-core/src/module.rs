//! Module contract: the capabilities a registered module class can provide

use crate::context::ModuleContext;
use crate::descriptor::{ModuleDescriptor, Role};
use crate::error::{ModuleError, RegistryError};
use crate::params::BoundParams;
use std::path::Path;
use std::sync::Arc;
use video_pipeline_common::{Frame, VideoResource};

/// Lazy, single-pass frame sequence
pub type FrameStream = Box<dyn Iterator<Item = Result<Frame, ModuleError>> + Send>;

/// An opened source: its resource handle plus the frames it yields
pub struct SourceStream {
    pub resource: VideoResource,
    pub frames: FrameStream,
}

impl SourceStream {
    /// Name used for derived artifacts
    #[must_use]
    pub fn name(&self) -> String {
        self.resource.stem()
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Produces the frame sequence a run starts from
pub trait SourceModule: Send + Sync {
    /// Open the resource named by the parameters
    ///
    /// Must fail with [`ModuleError::Resource`] if it cannot be opened.
    fn open(&self, params: &BoundParams, ctx: &ModuleContext) -> Result<SourceStream, ModuleError>;
}

/// In-process per-frame transform
pub trait FrameModule: Send + Sync {
    /// Transform one tick; `inputs` are the upstream frames in declaration order
    fn process_frame(&self, inputs: &[&Frame], params: &BoundParams) -> Result<Frame, ModuleError>;
}

/// Whole-resource batch step (typically an external executable)
pub trait ResourceModule: Send + Sync {
    /// Read `input`, write `output`, and describe what was written
    fn execute(
        &self,
        params: &BoundParams,
        input: &VideoResource,
        output: &Path,
    ) -> Result<VideoResource, ModuleError>;
}

/// Terminal node; the composer writes its frames, then hands over the artifact
pub trait SinkModule: Send + Sync {
    /// Post-process a finished artifact
    ///
    /// Returns `None` when the artifact is final as written.
    fn finalize(
        &self,
        _params: &BoundParams,
        _artifact: &VideoResource,
        _output: &Path,
    ) -> Result<Option<VideoResource>, ModuleError> {
        Ok(None)
    }
}

/// Closed set of module capabilities, resolved once per node
#[derive(Clone)]
pub enum ModuleImpl {
    Source(Arc<dyn SourceModule>),
    Frame(Arc<dyn FrameModule>),
    Resource(Arc<dyn ResourceModule>),
    Sink(Arc<dyn SinkModule>),
}

impl ModuleImpl {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleImpl::Source(_) => "source",
            ModuleImpl::Frame(_) => "frame transform",
            ModuleImpl::Resource(_) => "whole-resource transform",
            ModuleImpl::Sink(_) => "sink",
        }
    }

    fn matches(&self, role: Role) -> bool {
        matches!(
            (self, role),
            (ModuleImpl::Source(_), Role::Source)
                | (ModuleImpl::Frame(_) | ModuleImpl::Resource(_), Role::Transform)
                | (ModuleImpl::Sink(_), Role::Sink)
        )
    }
}

/// Descriptor and implementation of one module class
#[derive(Clone)]
pub struct RegisteredModule {
    descriptor: ModuleDescriptor,
    implementation: ModuleImpl,
}

impl RegisteredModule {
    /// Pair a descriptor with its implementation
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoleMismatch`] when the implementation does not
    /// fit the declared role.
    pub fn new(
        descriptor: ModuleDescriptor,
        implementation: ModuleImpl,
    ) -> Result<Self, RegistryError> {
        if !implementation.matches(descriptor.role()) {
            return Err(RegistryError::RoleMismatch {
                id: descriptor.id().to_string(),
                declared: descriptor.role(),
                implemented: implementation.kind(),
            });
        }
        Ok(Self {
            descriptor,
            implementation,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn implementation(&self) -> &ModuleImpl {
        &self.implementation
    }

    #[must_use]
    pub fn is_resource_step(&self) -> bool {
        matches!(self.implementation, ModuleImpl::Resource(_))
    }
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("id", &self.descriptor.id())
            .field("role", &self.descriptor.role())
            .field("kind", &self.implementation.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl FrameModule for Passthrough {
        fn process_frame(
            &self,
            inputs: &[&Frame],
            _params: &BoundParams,
        ) -> Result<Frame, ModuleError> {
            Ok(inputs[0].clone())
        }
    }

    #[test]
    fn test_role_mismatch_rejected() {
        let d = ModuleDescriptor::builder("p", Role::Sink).build().unwrap();
        let err = RegisteredModule::new(d, ModuleImpl::Frame(Arc::new(Passthrough))).unwrap_err();
        assert!(matches!(err, RegistryError::RoleMismatch { .. }));
    }

    #[test]
    fn test_transform_accepts_frame_impl() {
        let d = ModuleDescriptor::builder("p", Role::Transform)
            .build()
            .unwrap();
        let m = RegisteredModule::new(d, ModuleImpl::Frame(Arc::new(Passthrough))).unwrap();
        assert_eq!(m.id(), "p");
        assert!(!m.is_resource_step());
    }
}
