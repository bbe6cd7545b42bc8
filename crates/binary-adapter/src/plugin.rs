//! Registry glue: installed binaries as whole-resource transforms or sinks

use crate::{
    build_command_args, platform_dir, run_binary, BinaryConfig, BinaryError, BinaryParameter,
    BinaryRole, CONFIG_FILE,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use video_pipeline_common::VideoResource;
use video_pipeline_core::{
    BoundParams, ModuleDescriptor, ModuleError, ModuleImpl, ModuleRegistry, RegisteredModule,
    ResourceModule, SinkModule,
};

/// Parameters that, when declared, describe the geometry of the output
const WIDTH_PARAM: &str = "width";
const HEIGHT_PARAM: &str = "height";
const FPS_PARAMS: [&str; 2] = ["fps", "frame_rate"];

/// An installed external binary bound to its config
pub struct BinaryModule {
    config: BinaryConfig,
    executable: PathBuf,
}

impl BinaryModule {
    #[must_use]
    pub fn new(config: BinaryConfig, executable: impl Into<PathBuf>) -> Self {
        Self {
            config,
            executable: executable.into(),
        }
    }

    /// Load from an installed platform directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the executable is missing.
    pub fn load(dir: &Path) -> Result<Self, BinaryError> {
        let config = BinaryConfig::from_file(&dir.join(CONFIG_FILE))?;
        let executable = dir.join(config.executable_name());
        if !executable.is_file() {
            return Err(BinaryError::NotFound(executable.display().to_string()));
        }
        Ok(Self::new(config, executable))
    }

    #[must_use]
    pub fn config(&self) -> &BinaryConfig {
        &self.config
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn declares(&self, name: &str) -> bool {
        self.config.visible_parameters().any(|p| p.name == name)
    }

    /// Output handle: input geometry, overridden by declared geometry parameters
    fn output_handle(&self, params: &BoundParams, input: &VideoResource, output: &Path) -> VideoResource {
        let dimension = |name: &str, fallback: u32| {
            if !self.declares(name) {
                return fallback;
            }
            params
                .get_int(name)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(fallback)
        };
        let fps = FPS_PARAMS
            .iter()
            .filter(|name| self.declares(name))
            .find_map(|name| params.get_float(name))
            .filter(|fps| *fps > 0.0)
            .unwrap_or(input.fps);
        VideoResource::new(
            output,
            dimension(WIDTH_PARAM, input.width),
            dimension(HEIGHT_PARAM, input.height),
            fps,
        )
    }

    fn run(
        &self,
        params: &BoundParams,
        input: &VideoResource,
        output: &Path,
    ) -> Result<VideoResource, BinaryError> {
        let args = build_command_args(&self.config, params, &input.path, output)?;
        info!(
            "Running {} on {} -> {}",
            self.config.name,
            input.path.display(),
            output.display()
        );
        let captured = run_binary(&self.executable, &args)?;
        if !captured.stderr.is_empty() {
            debug!("{} stderr: {}", self.config.name, captured.stderr.trim_end());
        }
        if !output.is_file() {
            return Err(BinaryError::NotFound(format!(
                "{} produced no output at {}",
                self.config.name,
                output.display()
            )));
        }
        Ok(self.output_handle(params, input, output))
    }
}

impl std::fmt::Debug for BinaryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryModule")
            .field("name", &self.config.name)
            .field("executable", &self.executable)
            .finish()
    }
}

impl ResourceModule for BinaryModule {
    fn execute(
        &self,
        params: &BoundParams,
        input: &VideoResource,
        output: &Path,
    ) -> Result<VideoResource, ModuleError> {
        Ok(self.run(params, input, output)?)
    }
}

impl SinkModule for BinaryModule {
    fn finalize(
        &self,
        params: &BoundParams,
        artifact: &VideoResource,
        output: &Path,
    ) -> Result<Option<VideoResource>, ModuleError> {
        Ok(Some(self.run(params, artifact, output)?))
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Install one binary from `<binaries_dir>/<name>/<platform>/` into the registry
///
/// # Errors
///
/// Returns [`BinaryError::NotFound`] when there is no build for this platform,
/// or the config/descriptor error that prevented registration.
pub fn install(
    registry: &ModuleRegistry,
    binaries_dir: &Path,
    name: &str,
) -> Result<ModuleDescriptor, BinaryError> {
    let dir = binaries_dir.join(name).join(platform_dir());
    if !dir.is_dir() {
        return Err(BinaryError::NotFound(format!(
            "{name} has no build for {}",
            platform_dir()
        )));
    }
    let module = BinaryModule::load(&dir)?;
    make_executable(module.executable())?;

    let descriptor = module.config().descriptor()?;
    let role = module.config().role;
    let module = Arc::new(module);
    let implementation = match role {
        BinaryRole::Transform => ModuleImpl::Resource(module),
        BinaryRole::Sink => ModuleImpl::Sink(module),
    };
    registry.register(RegisteredModule::new(descriptor.clone(), implementation)?);
    info!("Installed binary {} from {}", descriptor.id(), dir.display());
    Ok(descriptor)
}

/// Outcome of scanning the binaries directory
#[derive(Debug, Default, Clone, Serialize)]
pub struct InstallReport {
    pub installed: Vec<String>,
    /// Directory name and the reason it was skipped
    pub skipped: Vec<(String, String)>,
}

fn binary_dirs(binaries_dir: &Path) -> std::io::Result<Vec<String>> {
    if !binaries_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(binaries_dir)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Install every binary under `binaries_dir`; failures are reported, not fatal
///
/// # Errors
///
/// Returns an error only if the directory itself cannot be read.
pub fn install_all(registry: &ModuleRegistry, binaries_dir: &Path) -> Result<InstallReport, BinaryError> {
    let mut report = InstallReport::default();
    for name in binary_dirs(binaries_dir)? {
        match install(registry, binaries_dir, &name) {
            Ok(descriptor) => report.installed.push(descriptor.id().to_string()),
            Err(e) => {
                warn!("Skipping binary {}: {}", name, e);
                report.skipped.push((name, e.to_string()));
            }
        }
    }
    info!(
        "Binary scan of {}: {} installed, {} skipped",
        binaries_dir.display(),
        report.installed.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Name, role and caller-visible parameters of an available binary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinarySummary {
    pub name: String,
    pub role: BinaryRole,
    pub parameters: Vec<BinaryParameter>,
}

/// Binaries with a readable config for this platform
///
/// # Errors
///
/// Returns an error only if the directory itself cannot be read.
pub fn list_binaries(binaries_dir: &Path) -> Result<Vec<BinarySummary>, BinaryError> {
    let platform = platform_dir();
    let mut summaries = Vec::new();
    for name in binary_dirs(binaries_dir)? {
        let config_path = binaries_dir.join(&name).join(&platform).join(CONFIG_FILE);
        match BinaryConfig::from_file(&config_path) {
            Ok(config) => summaries.push(BinarySummary {
                parameters: config.visible_parameters().cloned().collect(),
                role: config.role,
                name: config.name,
            }),
            Err(e) => debug!("Not listing {}: {}", name, e),
        }
    }
    Ok(summaries)
}
