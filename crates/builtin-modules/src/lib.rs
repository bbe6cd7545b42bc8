//! Built-in module catalogue: `video_source`, `blur`, `resize`, `color`, `result`

pub mod blur;
pub mod color;
pub mod resize;
pub mod result;
pub mod source;

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use video_pipeline_core::{
    DescriptorError, ModuleImpl, ModuleRegistry, RegisteredModule, RegistryError,
};

pub use blur::Blur;
pub use color::{Color, ColorSpace};
pub use resize::{Interpolation, Resize};
pub use result::ResultSink;
pub use source::VideoSource;

#[derive(Error, Debug)]
pub enum BuiltinError {
    #[error("Invalid built-in descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Cannot register built-in module: {0}")]
    Registry(#[from] RegistryError),
}

/// Every built-in module, ready to register
///
/// # Errors
///
/// Returns an error if a descriptor is malformed or does not match its
/// implementation.
pub fn builtin_modules() -> Result<Vec<RegisteredModule>, BuiltinError> {
    let modules = vec![
        RegisteredModule::new(source::descriptor()?, ModuleImpl::Source(Arc::new(VideoSource)))?,
        RegisteredModule::new(blur::descriptor()?, ModuleImpl::Frame(Arc::new(Blur)))?,
        RegisteredModule::new(resize::descriptor()?, ModuleImpl::Frame(Arc::new(Resize)))?,
        RegisteredModule::new(color::descriptor()?, ModuleImpl::Frame(Arc::new(Color)))?,
        RegisteredModule::new(result::descriptor()?, ModuleImpl::Sink(Arc::new(ResultSink)))?,
    ];
    Ok(modules)
}

/// Register the built-in catalogue
///
/// # Errors
///
/// See [`builtin_modules`].
pub fn register_builtins(registry: &ModuleRegistry) -> Result<(), BuiltinError> {
    let modules = builtin_modules()?;
    let count = modules.len();
    for module in modules {
        registry.register(module);
    }
    info!("Registered {} built-in modules", count);
    Ok(())
}

/// A registry holding only the built-in catalogue
///
/// # Errors
///
/// See [`builtin_modules`].
pub fn default_registry() -> Result<ModuleRegistry, BuiltinError> {
    let registry = ModuleRegistry::new();
    register_builtins(&registry)?;
    Ok(registry)
}
