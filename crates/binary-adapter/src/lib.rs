//! External executables as pipeline modules
//!
//! An installed binary lives in `<binaries_dir>/<name>/<OS>-<arch>/` next to a
//! `config.json` describing its command line:
//!
//! ```json
//! {
//!   "name": "denoise",
//!   "parameters": [
//!     { "name": "input",  "flag": "-i", "type": "string", "required": true },
//!     { "name": "output", "flag": "-o", "type": "string", "required": true },
//!     { "name": "width",  "flag": "-w", "type": "int", "required": true, "min": 16 },
//!     { "name": "verbose", "flag": "-v", "type": "bool" }
//!   ]
//! }
//! ```
//!
//! `input` and `output` are bound to the resource locators by the adapter and
//! never shown to callers. Arguments are emitted in declaration order.

pub mod plugin;

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use video_pipeline_core::{
    BoundParams, DescriptorError, FormatDescriptor, ModuleDescriptor, ModuleError, ParamType,
    ParamValue, ParameterDefinition, RegistryError, Role,
};

pub use plugin::{install, install_all, list_binaries, BinaryModule, BinarySummary, InstallReport};

/// Parameter bound to the input locator
pub const INPUT_PARAM: &str = "input";

/// Parameter bound to the output locator
pub const OUTPUT_PARAM: &str = "output";

/// File describing an installed binary
pub const CONFIG_FILE: &str = "config.json";

/// Errors specific to external binaries
#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("Binary not installed: {0}")]
    NotFound(String),

    #[error("Invalid binary config {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("Invalid binary descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status:?}")]
    Failed {
        program: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<BinaryError> for ModuleError {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::Failed {
                program,
                status,
                stdout,
                stderr,
            } => ModuleError::Process {
                program,
                status,
                stdout,
                stderr,
            },
            BinaryError::MissingParameter(_) => ModuleError::InvalidInput(err.to_string()),
            BinaryError::NotFound(_) | BinaryError::Spawn { .. } => {
                ModuleError::Resource(err.to_string())
            }
            BinaryError::Io(e) => ModuleError::Io(e),
            other => ModuleError::ExecutionFailed(other.to_string()),
        }
    }
}

/// How the binary participates in a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryRole {
    /// Whole-resource transform
    #[default]
    Transform,
    /// Post-processes a result artifact
    Sink,
}

/// One command-line parameter declared by a binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryParameter {
    pub name: String,
    /// Flag preceding the value; empty for positional arguments
    #[serde(default)]
    pub flag: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BinaryParameter {
    /// Whether the adapter fills this parameter itself
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.name == INPUT_PARAM || self.name == OUTPUT_PARAM
    }

    fn definition(&self) -> ParameterDefinition {
        let mut def = match (&self.options, self.param_type) {
            (Some(options), _) => ParameterDefinition::select(&self.name, options.as_slice()),
            (None, ParamType::Int) => ParameterDefinition::int(&self.name),
            (None, ParamType::Float) => ParameterDefinition::float(&self.name),
            (None, ParamType::Bool) => ParameterDefinition::bool(&self.name),
            (None, ParamType::String | ParamType::Select) => ParameterDefinition::string(&self.name),
        };
        if self.min.is_some() || self.max.is_some() {
            def.constraint = video_pipeline_core::Constraint::Range {
                min: self.min,
                max: self.max,
            };
        }
        if let Some(default) = &self.default {
            def = def.with_default(default.clone());
        }
        if self.required {
            def = def.required();
        }
        if let Some(text) = &self.description {
            def = def.describe(text);
        }
        def
    }
}

/// Contents of an installed binary's `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryConfig {
    pub name: String,
    /// Executable file name inside the platform directory; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default)]
    pub role: BinaryRole,
    #[serde(default)]
    pub parameters: Vec<BinaryParameter>,
    #[serde(default)]
    pub input_formats: Vec<FormatDescriptor>,
    #[serde(default)]
    pub output_formats: Vec<FormatDescriptor>,
}

impl BinaryConfig {
    /// # Errors
    ///
    /// Returns [`BinaryError::InvalidConfig`] if the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self, BinaryError> {
        let invalid = |reason: String| BinaryError::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        if config.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        Ok(config)
    }

    /// Executable file name for the current platform
    #[must_use]
    pub fn executable_name(&self) -> String {
        let name = self.executable.clone().unwrap_or_else(|| self.name.clone());
        if cfg!(windows) && !name.to_ascii_lowercase().ends_with(".exe") {
            format!("{name}.exe")
        } else {
            name
        }
    }

    /// Parameters callers may set
    pub fn visible_parameters(&self) -> impl Iterator<Item = &BinaryParameter> {
        self.parameters.iter().filter(|p| !p.is_reserved())
    }

    /// Descriptor exposing the visible parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the declared parameters do not form a valid schema.
    pub fn descriptor(&self) -> Result<ModuleDescriptor, DescriptorError> {
        let role = match self.role {
            BinaryRole::Transform => Role::Transform,
            BinaryRole::Sink => Role::Sink,
        };
        let mut builder = ModuleDescriptor::builder(&self.name, role)
            .description(&format!("External binary {}", self.executable_name()));
        for p in self.visible_parameters() {
            builder = builder.parameter(p.definition());
        }
        let inputs = if self.input_formats.is_empty() {
            vec![FormatDescriptor::yuv420p()]
        } else {
            self.input_formats.clone()
        };
        let outputs = if self.output_formats.is_empty() {
            vec![FormatDescriptor::yuv420p()]
        } else {
            self.output_formats.clone()
        };
        for f in inputs {
            builder = builder.input_format(f);
        }
        for f in outputs {
            builder = builder.output_format(f);
        }
        builder.build()
    }
}

/// Platform directory name: `{Linux|Darwin|Windows}-{machine}`
#[must_use]
pub fn platform_dir() -> String {
    let os = match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    };
    let arch = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "arm64",
        ("windows", "x86_64") => "AMD64",
        (_, arch) => arch,
    };
    format!("{os}-{arch}")
}

/// Build the argument list in declaration order
///
/// # Errors
///
/// Returns [`BinaryError::MissingParameter`] when a required non-boolean
/// parameter has no bound value.
pub fn build_command_args(
    config: &BinaryConfig,
    params: &BoundParams,
    input: &Path,
    output: &Path,
) -> Result<Vec<OsString>, BinaryError> {
    let mut args = Vec::new();
    let mut push = |flag: &str, value: Option<OsString>| {
        if !flag.is_empty() {
            args.push(OsString::from(flag));
        }
        if let Some(value) = value {
            args.push(value);
        }
    };

    for p in &config.parameters {
        if p.name == INPUT_PARAM {
            push(&p.flag, Some(input.as_os_str().to_owned()));
            continue;
        }
        if p.name == OUTPUT_PARAM {
            push(&p.flag, Some(output.as_os_str().to_owned()));
            continue;
        }
        match (p.param_type, params.get(&p.name)) {
            (ParamType::Bool, Some(value)) => {
                if value.is_truthy() {
                    push(&p.flag, None);
                }
            }
            (ParamType::Bool, None) => {}
            (_, Some(value)) => push(&p.flag, Some(OsString::from(value.to_string()))),
            (_, None) if p.required => return Err(BinaryError::MissingParameter(p.name.clone())),
            (_, None) => {}
        }
    }
    Ok(args)
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an executable to completion, capturing stdout and stderr
///
/// # Errors
///
/// Returns [`BinaryError::Spawn`] if it cannot be started and
/// [`BinaryError::Failed`] on a non-zero exit.
pub fn run_binary(executable: &Path, args: &[OsString]) -> Result<RunOutput, BinaryError> {
    let program = executable.display().to_string();
    let mut cmd = Command::new(executable);
    cmd.args(args);
    debug!("Binary command: {:?}", cmd);

    let started = Instant::now();
    let output = cmd.output().map_err(|source| BinaryError::Spawn {
        program: program.clone(),
        source,
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(BinaryError::Failed {
            program,
            status: output.status.code(),
            stdout,
            stderr,
        });
    }
    info!(
        "{} finished in {:?} ({} bytes stdout, {} bytes stderr)",
        program,
        started.elapsed(),
        stdout.len(),
        stderr.len()
    );
    Ok(RunOutput { stdout, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_pipeline_core::bind;

    fn config() -> BinaryConfig {
        serde_json::from_str(
            r#"{
                "name": "proc",
                "parameters": [
                    { "name": "input", "flag": "-i", "type": "string", "required": true },
                    { "name": "width", "flag": "-w", "type": "int", "required": true, "min": 16, "max": 4096 },
                    { "name": "mode", "flag": "--mode", "type": "string", "options": ["fast", "slow"], "default": "fast" },
                    { "name": "verbose", "flag": "-v", "type": "bool" },
                    { "name": "quiet", "flag": "-q", "type": "bool" },
                    { "name": "gain", "flag": "-g", "type": "float" },
                    { "name": "output", "flag": "-o", "type": "str", "required": true }
                ]
            }"#,
        )
        .unwrap()
    }

    fn args(pairs: &[(&str, ParamValue)]) -> Vec<String> {
        let config = config();
        let supplied: Vec<(String, ParamValue)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let params = bind("n", &config.descriptor().unwrap(), &supplied).unwrap();
        build_command_args(&config, &params, Path::new("in.yuv"), Path::new("out.yuv"))
            .unwrap()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_in_declared_order() {
        let got = args(&[
            ("width", 320.into()),
            ("verbose", true.into()),
            ("quiet", false.into()),
        ]);
        assert_eq!(
            got,
            ["-i", "in.yuv", "-w", "320", "--mode", "fast", "-v", "-o", "out.yuv"]
        );
    }

    #[test]
    fn test_optional_value_omitted() {
        let got = args(&[("width", 64.into()), ("gain", 1.5.into())]);
        assert!(got.windows(2).any(|w| w == ["-g", "1.5"]));
        assert!(!got.contains(&"-v".to_string()));
    }

    #[test]
    fn test_reserved_parameters_hidden() {
        let descriptor = config().descriptor().unwrap();
        let names: Vec<&str> = descriptor.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["width", "mode", "verbose", "quiet", "gain"]);
        assert_eq!(descriptor.role(), Role::Transform);
        assert!(descriptor.parameter("mode").unwrap().options().is_some());
    }

    #[test]
    fn test_missing_required_without_binding() {
        let config = config();
        let err = build_command_args(
            &config,
            &BoundParams::default(),
            Path::new("a"),
            Path::new("b"),
        )
        .unwrap_err();
        assert!(matches!(err, BinaryError::MissingParameter(ref p) if p == "width"));
    }

    #[test]
    fn test_platform_dir_shape() {
        let dir = platform_dir();
        let (os, arch) = dir.split_once('-').unwrap();
        assert!(!os.is_empty() && !arch.is_empty());
    }

    #[test]
    fn test_failed_maps_to_process_error() {
        let err = ModuleError::from(BinaryError::Failed {
            program: "x".into(),
            status: Some(2),
            stdout: String::new(),
            stderr: "bad".into(),
        });
        assert!(matches!(err, ModuleError::Process { status: Some(2), .. }));
    }
}
