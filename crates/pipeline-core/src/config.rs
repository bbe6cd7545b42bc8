//! Pipeline configuration (YAML file plus environment overrides)

use crate::context::ModuleContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Environment variable naming an optional YAML config file
pub const CONFIG_ENV: &str = "PIPELINE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for {var}")]
    InvalidValue { var: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where source videos are looked up
    pub video_dir: PathBuf,

    /// Where output artifacts are written
    pub output_dir: PathBuf,

    /// Root of installed external binaries
    pub binaries_dir: PathBuf,

    /// Bounded buffer size of each fan-out channel
    pub channel_capacity: usize,

    /// Frame rate for raw files whose name carries none
    pub default_fps: f64,

    /// Payload type announced to live-stream clients
    pub stream_mime: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            output_dir: PathBuf::from("output"),
            binaries_dir: PathBuf::from("binaries"),
            channel_capacity: 8,
            default_fps: 30.0,
            stream_mime: "image/png".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `PIPELINE_CONFIG` (if set), then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// has an invalid value.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        info!(
            "Pipeline config: videos={}, output={}, binaries={}",
            config.video_dir.display(),
            config.output_dir.display(),
            config.binaries_dir.display()
        );
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a config.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `PIPELINE_*` overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparsable capacity.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("PIPELINE_VIDEO_DIR") {
            self.video_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PIPELINE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PIPELINE_BINARIES_DIR") {
            self.binaries_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PIPELINE_CHANNEL_CAPACITY") {
            self.channel_capacity = v
                .parse()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: "PIPELINE_CHANNEL_CAPACITY".to_string(),
                    value: v.clone(),
                })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn module_context(&self) -> ModuleContext {
        ModuleContext::new(&self.video_dir, self.default_fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml("video_dir: /srv/videos\nchannel_capacity: 2\n").unwrap();
        assert_eq!(config.video_dir, PathBuf::from("/srv/videos"));
        assert_eq!(config.channel_capacity, 2);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.stream_mime, "image/png");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PIPELINE_OUTPUT_DIR", "/tmp/out"),
            ("PIPELINE_CHANNEL_CAPACITY", "16"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.video_dir, PathBuf::from("videos"));
    }

    #[test]
    fn test_invalid_capacity() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PIPELINE_CHANNEL_CAPACITY").then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            PipelineConfig::from_file(Path::new("/nonexistent/pipeline.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
