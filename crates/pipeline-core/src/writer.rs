//! Raw planar artifact writer
//!
//! The file is created on the first frame so that its name can carry the frame
//! geometry: `{base}_{width}x{height}.yuv`. A writer that never sees a frame
//! leaves an empty `{base}.yuv`. Frames whose size differs from the first one
//! are dropped, so an artifact always holds a single geometry.

use crate::error::PipelineError;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use video_pipeline_codec::PlanarWriter;
use video_pipeline_common::{Frame, VideoResource};

/// A finished output file
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Artifact {
    /// File name reported to callers
    #[must_use]
    pub fn locator(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn resource(&self, fps: f64) -> VideoResource {
        VideoResource::new(&self.path, self.width, self.height, fps)
    }

    /// Remove the file from disk
    ///
    /// # Errors
    ///
    /// Returns an IO error other than "not found".
    pub fn discard(self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Name of an artifact once its geometry is known
#[must_use]
pub fn artifact_file_name(base: &str, width: u32, height: u32) -> String {
    format!("{base}_{width}x{height}.yuv")
}

pub struct ArtifactWriter {
    dir: PathBuf,
    base: String,
    inner: Option<(PathBuf, PlanarWriter<BufWriter<File>>)>,
    dropped: u64,
}

impl ArtifactWriter {
    pub fn new(dir: &Path, base: impl Into<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: base.into(),
            inner: None,
            dropped: 0,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        if self.inner.is_none() {
            let (w, h) = frame.dimensions();
            let path = self.dir.join(artifact_file_name(&self.base, w, h));
            debug!("Creating artifact {}", path.display());
            let writer = PlanarWriter::create(&path)?;
            self.inner = Some((path, writer));
        }
        if let Some((path, writer)) = self.inner.as_mut() {
            let locked = writer.geometry().map(|g| (g.width, g.height));
            if locked.is_some_and(|dims| dims != frame.dimensions()) {
                if self.dropped == 0 {
                    warn!(
                        "{}: dropping {:?} frames, artifact geometry is {:?}",
                        path.display(),
                        frame.dimensions(),
                        locked
                    );
                }
                self.dropped += 1;
                return Ok(());
            }
            writer.write_frame(frame)?;
        }
        Ok(())
    }

    /// Frames skipped because their size differed from the first frame
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Flush and describe the artifact
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails or the empty placeholder cannot be created.
    pub fn finish(self) -> Result<Artifact, PipelineError> {
        let artifact = match self.inner {
            Some((path, writer)) => {
                let geometry = writer.geometry();
                let frames = writer.finish()?;
                Artifact {
                    path,
                    frames,
                    width: geometry.map_or(0, |g| g.width),
                    height: geometry.map_or(0, |g| g.height),
                }
            }
            None => {
                let path = self.dir.join(format!("{}.yuv", self.base));
                File::create(&path)?;
                Artifact {
                    path,
                    frames: 0,
                    width: 0,
                    height: 0,
                }
            }
        };
        info!(
            "Finalized artifact {} ({} frames, {} dropped)",
            artifact.path.display(),
            artifact.frames,
            self.dropped
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_carries_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(dir.path(), "clip-abc");
        writer.write(&Frame::new(16, 8)).unwrap();
        writer.write(&Frame::new(16, 8)).unwrap();
        let artifact = writer.finish().unwrap();
        assert_eq!(artifact.locator(), "clip-abc_16x8.yuv");
        assert_eq!(artifact.frames, 2);
        assert_eq!(
            std::fs::metadata(&artifact.path).unwrap().len(),
            2 * (16 * 8 * 3 / 2)
        );
    }

    #[test]
    fn test_empty_artifact_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ArtifactWriter::new(dir.path(), "none").finish().unwrap();
        assert_eq!(artifact.locator(), "none.yuv");
        assert!(artifact.path.exists());
        let path = artifact.path.clone();
        artifact.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_geometry_change_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(dir.path(), "x");
        writer.write(&Frame::new(16, 8)).unwrap();
        writer.write(&Frame::new(8, 8)).unwrap();
        writer.write(&Frame::new(16, 8)).unwrap();
        assert_eq!(writer.dropped(), 1);
        let artifact = writer.finish().unwrap();
        assert_eq!(artifact.locator(), "x_16x8.yuv");
        assert_eq!(artifact.frames, 2);
    }
}
