//! Stages and their per-run resolution

use crate::environment::BuildEnvironment;
use stackbuild_config::{CommandConfig, PatchConfig, SourceConfig, StageConfig};
use stackbuild_errors::Error;
use stackbuild_platform::PlatformCommand;
use std::path::{Path, PathBuf};

/// One unit of the pipeline, built once from configuration
///
/// Fields stay templated; [`Stage::resolve`] binds them against the
/// environment snapshot in effect when the stage's turn comes, so values
/// exported by earlier stages are visible.
#[derive(Debug, Clone)]
pub struct Stage {
    index: usize,
    config: StageConfig,
}

impl Stage {
    #[must_use]
    pub fn new(index: usize, config: StageConfig) -> Self {
        Self { index, config }
    }

    /// Build the ordered stage list from configuration
    #[must_use]
    pub fn from_configs(configs: &[StageConfig]) -> Vec<Self> {
        configs
            .iter()
            .enumerate()
            .map(|(index, config)| Self::new(index, config.clone()))
            .collect()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Position in the pipeline, starting at 0
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Bind every template of the stage against `env`
    ///
    /// Relative paths are taken relative to `build_root`. Nothing on disk
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::UndefinedVariable` for the first reference to
    /// an unset variable.
    pub fn resolve(
        &self,
        env: &BuildEnvironment,
        build_root: &Path,
        shell: &str,
    ) -> Result<ResolvedStage, Error> {
        let name = self.name();
        let path = |template: &str| -> Result<PathBuf, Error> {
            let value = env.substitute(name, template)?;
            let value = PathBuf::from(value);
            Ok(if value.is_absolute() {
                value
            } else {
                build_root.join(value)
            })
        };
        let opt_path = |template: Option<&String>| -> Result<Option<PathBuf>, Error> {
            template.map(|t| path(t)).transpose()
        };

        let artifact = opt_path(self.config.artifact.as_ref())?;
        let install_marker = opt_path(self.config.install_marker.as_ref())?;
        let workdir = match &self.config.workdir {
            Some(dir) => Some(path(dir)?),
            None => artifact.clone(),
        };

        let source = match &self.config.source {
            None => None,
            Some(SourceConfig::Url(src)) => Some(ResolvedSource::Url {
                url: env.substitute(name, &src.url)?,
                filename: src
                    .filename
                    .as_deref()
                    .map(|f| env.substitute(name, f))
                    .transpose()?,
                sha256: src.sha256.clone(),
                blake3: src.blake3.clone(),
            }),
            Some(SourceConfig::Git(src)) => Some(ResolvedSource::Git {
                url: env.substitute(name, &src.git)?,
                reference: src
                    .reference
                    .as_deref()
                    .map(|r| env.substitute(name, r))
                    .transpose()?,
            }),
            Some(SourceConfig::Path(src)) => Some(ResolvedSource::Path {
                path: path(&src.path)?,
            }),
        };

        let mut commands = Vec::with_capacity(self.config.commands.len());
        for command in &self.config.commands {
            commands.push(match command {
                CommandConfig::Shell(line) => {
                    let line = env.substitute(name, line)?;
                    ResolvedCommand {
                        display: line.clone(),
                        command: PlatformCommand::shell(shell, &line),
                        dir: workdir.clone(),
                    }
                }
                CommandConfig::Exec { program, args, dir } => {
                    let mut cmd = PlatformCommand::new(&env.substitute(name, program)?);
                    for arg in args {
                        cmd.arg(env.substitute(name, arg)?);
                    }
                    let dir = match dir {
                        Some(d) => Some(path(d)?),
                        None => workdir.clone(),
                    };
                    ResolvedCommand {
                        display: cmd.to_string(),
                        command: cmd,
                        dir,
                    }
                }
            });
        }

        let mut patches = Vec::with_capacity(self.config.patches.len());
        for patch in &self.config.patches {
            let file = PathBuf::from(env.substitute(name, &patch.file)?);
            let file = match (&workdir, file.is_absolute()) {
                (Some(dir), false) => dir.join(file),
                _ => file,
            };
            patches.push(ResolvedPatch {
                file,
                record: patch.clone(),
            });
        }

        let requires_tools = self
            .config
            .requires
            .tools
            .iter()
            .map(|t| env.substitute(name, t))
            .collect::<Result<Vec<_>, _>>()?;
        let requires_paths = self
            .config
            .requires
            .paths
            .iter()
            .map(|p| path(p))
            .collect::<Result<Vec<_>, _>>()?;

        let vendor_check = self
            .config
            .vendor_check
            .as_ref()
            .map(|check| -> Result<VendorProbe, Error> {
                Ok(VendorProbe {
                    command: env.substitute(name, &check.command)?,
                    contains: env.substitute(name, &check.contains)?,
                })
            })
            .transpose()?;

        Ok(ResolvedStage {
            name: name.to_string(),
            index: self.index,
            source,
            artifact,
            install_marker,
            workdir,
            commands,
            patches,
            clean: opt_path(self.config.clean.as_ref())?,
            requires_tools,
            requires_paths,
            vendor_check,
        })
    }
}

/// A stage with every template bound to concrete values
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    pub name: String,
    pub index: usize,
    pub source: Option<ResolvedSource>,
    pub artifact: Option<PathBuf>,
    pub install_marker: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub commands: Vec<ResolvedCommand>,
    pub patches: Vec<ResolvedPatch>,
    pub clean: Option<PathBuf>,
    pub requires_tools: Vec<String>,
    pub requires_paths: Vec<PathBuf>,
    pub vendor_check: Option<VendorProbe>,
}

impl ResolvedStage {
    /// A stage that only fetches and extracts
    #[must_use]
    pub fn is_fetch_only(&self) -> bool {
        self.install_marker.is_none() && self.commands.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Url {
        url: String,
        filename: Option<String>,
        sha256: Option<String>,
        blake3: Option<String>,
    },
    Git {
        url: String,
        reference: Option<String>,
    },
    Path {
        path: PathBuf,
    },
}

impl ResolvedSource {
    /// Reference used in diagnostics
    #[must_use]
    pub fn reference(&self) -> String {
        match self {
            Self::Url { url, .. } | Self::Git { url, .. } => url.clone(),
            Self::Path { path } => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    /// Text shown in events and diagnostics
    pub display: String,
    pub command: PlatformCommand,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPatch {
    /// Absolute path of the file to edit
    pub file: PathBuf,
    pub record: PatchConfig,
}

#[derive(Debug, Clone)]
pub struct VendorProbe {
    pub command: String,
    pub contains: String,
}
