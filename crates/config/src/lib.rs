#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for stackbuild
//!
//! A single TOML pipeline file carries both the orchestrator settings and
//! the ordered stage list. Loading precedence:
//! - Default values (hard-coded)
//! - Pipeline file (`--config`, `./stackbuild.toml`, or the user config dir)
//! - Environment variables (`STACKBUILD_*`)
//! - CLI flags (applied by the binary)

pub mod constants;
pub mod stage;

pub use stage::{
    CommandConfig, GitSource, PatchCondition, PatchConfig, PathSource, RequiresConfig,
    SourceConfig, StageConfig, UrlSource, VendorCheckConfig,
};

use serde::{Deserialize, Serialize};
use stackbuild_errors::{ConfigError, Error};
use stackbuild_types::{ColorChoice, OutputFormat};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub build: BuildConfig,

    /// Base environment; values may reference each other with `${NAME}`
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub handoff: Option<HandoffConfig>,

    /// Ordered stage list
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageConfig>,

    /// Directory relative paths are resolved against (the pipeline file's
    /// directory once loaded)
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub build_root: Option<PathBuf>,
    pub install_prefix: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64, // seconds
}

/// Build execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_build_jobs")]
    pub jobs: usize, // 0 = auto-detect
    /// Host variables copied into the pipeline environment
    #[serde(default = "default_inherit")]
    pub inherit: Vec<String>,
    /// Interpreter for command strings
    #[serde(default = "default_shell")]
    pub shell: String,
}

/// Tools and paths checked before the first stage runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreflightConfig {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// What the downstream batch job consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Installed artifact path (templated)
    pub artifact: String,
    /// Variables the job needs
    #[serde(default)]
    pub vars: Vec<String>,
    /// Where `stackbuild env --write` puts the export script
    #[serde(default)]
    pub script: Option<String>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            connect_timeout: 30,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            inherit: default_inherit(),
            shell: default_shell(),
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_build_jobs() -> usize {
    0 // 0 = auto-detect
}

fn default_inherit() -> Vec<String> {
    constants::DEFAULT_INHERITED_VARS
        .iter()
        .map(|v| (*v).to_string())
        .collect()
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Config {
    /// Get the per-user pipeline file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join("stackbuild")
            .join(constants::USER_PIPELINE_FILE))
    }

    /// Parse a pipeline from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or does not match the
    /// pipeline schema.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents).map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let mut config = Self::from_toml(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), stages = config.stages.len(), "loaded pipeline");
        Ok(config)
    }

    /// Locate the pipeline file when none was given explicitly
    ///
    /// # Errors
    ///
    /// Returns an error if neither `./stackbuild.toml` nor the per-user file
    /// exists.
    pub fn discover() -> Result<PathBuf, Error> {
        let local = PathBuf::from(constants::LOCAL_PIPELINE_FILE);
        if local.exists() {
            return Ok(local);
        }
        let user = Self::default_path()?;
        if user.exists() {
            return Ok(user);
        }
        Err(ConfigError::NotFound {
            path: format!("{} or {}", local.display(), user.display()),
        }
        .into())
    }

    /// Load configuration from an optional path or discover it
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be found, read or parsed
    pub async fn load_or_discover(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load_from_file(&Self::discover()?).await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // STACKBUILD_OUTPUT
        if let Ok(output) = std::env::var("STACKBUILD_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "STACKBUILD_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // STACKBUILD_COLOR
        if let Ok(color) = std::env::var("STACKBUILD_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "STACKBUILD_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // STACKBUILD_JOBS
        if let Ok(jobs) = std::env::var("STACKBUILD_JOBS") {
            self.build.jobs = jobs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "STACKBUILD_JOBS".to_string(),
                value: jobs,
            })?;
        }

        // STACKBUILD_BUILD_ROOT
        if let Ok(root) = std::env::var("STACKBUILD_BUILD_ROOT") {
            self.paths.build_root = Some(PathBuf::from(root));
        }

        // STACKBUILD_PREFIX
        if let Ok(prefix) = std::env::var("STACKBUILD_PREFIX") {
            self.paths.install_prefix = Some(PathBuf::from(prefix));
        }

        Ok(())
    }

    /// Check the stage list and settings for mistakes that would only show
    /// up halfway through a run
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyPipeline.into());
        }

        if self.network.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.timeout".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.build.shell.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "build.shell".to_string(),
                value: self.build.shell.clone(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            validate_stage(stage)?;
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage {
                    name: stage.name.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the pipeline file's directory
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.base_dir {
            Some(base) if !base.as_os_str().is_empty() => base.join(path),
            _ => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path),
        }
    }

    /// Get the build root (with default `./build`)
    #[must_use]
    pub fn build_root(&self) -> PathBuf {
        let root = self
            .paths
            .build_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("build"));
        self.resolve(&root)
    }

    /// Get the install prefix (with default `<build_root>/install`)
    #[must_use]
    pub fn install_prefix(&self) -> PathBuf {
        self.paths
            .install_prefix
            .as_deref()
            .map_or_else(|| self.build_root().join("install"), |p| self.resolve(p))
    }

    /// Get the download directory (with default `<build_root>/downloads`)
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.paths
            .download_dir
            .as_deref()
            .map_or_else(|| self.build_root().join("downloads"), |p| self.resolve(p))
    }

    /// Get the log directory (with default `<build_root>/logs`)
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .as_deref()
            .map_or_else(|| self.build_root().join("logs"), |p| self.resolve(p))
    }

    /// Get the status log path
    #[must_use]
    pub fn status_log_path(&self) -> PathBuf {
        self.log_dir().join(constants::STATUS_LOG_FILE)
    }

    /// Effective parallel job count
    #[must_use]
    pub fn build_jobs(&self) -> usize {
        calculate_build_jobs(self.build.jobs)
    }
}

fn validate_stage(stage: &StageConfig) -> Result<(), Error> {
    let invalid = |message: &str| -> Error {
        ConfigError::InvalidStage {
            stage: stage.name.clone(),
            message: message.to_string(),
        }
        .into()
    };

    if stage.name.is_empty()
        || !stage
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "name must be non-empty and use only letters, digits, '-', '_' or '.'",
        ));
    }

    if stage.artifact.is_none() && stage.install_marker.is_none() {
        return Err(invalid(
            "declare `artifact` or `install_marker` so completed work can be detected",
        ));
    }

    if !stage.commands.is_empty() && stage.install_marker.is_none() {
        return Err(invalid(
            "a stage with commands needs an `install_marker` so a finished build can be skipped",
        ));
    }

    if stage.source.is_some() && stage.artifact.is_none() {
        return Err(invalid("a `source` needs an `artifact` directory to extract into"));
    }

    if !stage.commands.is_empty() && stage.workdir.is_none() && stage.artifact.is_none() {
        return Err(invalid("commands need a `workdir` or an `artifact` directory"));
    }

    for command in &stage.commands {
        let empty = match command {
            CommandConfig::Shell(line) => line.trim().is_empty(),
            CommandConfig::Exec { program, .. } => program.trim().is_empty(),
        };
        if empty {
            return Err(invalid("empty command"));
        }
    }

    for patch in &stage.patches {
        if patch.before.is_empty() || patch.after.is_empty() {
            return Err(invalid("patch `before` and `after` must not be empty"));
        }
        if let Some(condition) = &patch.when {
            semver::VersionReq::parse(&condition.req).map_err(|e| {
                invalid(&format!("patch condition `{}`: {e}", condition.req))
            })?;
        }
    }

    if let Some(check) = &stage.vendor_check {
        if check.command.trim().is_empty() || check.contains.is_empty() {
            return Err(invalid("vendor_check needs `command` and `contains`"));
        }
    }

    Ok(())
}

/// Calculate build jobs based on CPU count
#[must_use]
pub fn calculate_build_jobs(config_value: usize) -> usize {
    if config_value > 0 {
        config_value // User override
    } else {
        // Use 75% of CPUs for builds, minimum 1
        let cpus = num_cpus::get();
        (cpus * 3 / 4).max(1)
    }
}
