//! Per-run context handed to modules

use crate::error::ModuleError;
use std::path::{Component, Path, PathBuf};

/// Settings a module may need while opening or executing
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Directory relative source paths are resolved against
    pub video_dir: PathBuf,

    /// Frame rate used when a raw file name carries none
    pub default_fps: f64,
}

impl ModuleContext {
    pub fn new(video_dir: impl Into<PathBuf>, default_fps: f64) -> Self {
        Self {
            video_dir: video_dir.into(),
            default_fps,
        }
    }

    /// Resolve a caller-supplied locator against the video directory
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Resource`] unless the locator is a non-empty
    /// relative path made only of normal components.
    pub fn resolve_video(&self, locator: &str) -> Result<PathBuf, ModuleError> {
        let path = Path::new(locator);
        let contained = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if locator.is_empty() || !contained {
            return Err(ModuleError::Resource(format!(
                "invalid video locator: {locator:?}"
            )));
        }
        Ok(self.video_dir.join(path))
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self::new("videos", 30.0)
    }
}
