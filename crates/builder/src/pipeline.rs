//! Assembling a runnable pipeline from configuration

use crate::environment::BuildEnvironment;
use crate::handoff::Handoff;
use crate::orchestrator::PipelineSettings;
use crate::stage::Stage;
use stackbuild_config::{Config, HandoffConfig};
use stackbuild_errors::Error;

/// Stages, seed environment and settings derived from one configuration
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub environment: BuildEnvironment,
    pub settings: PipelineSettings,
    pub handoff: Option<HandoffConfig>,
}

impl Pipeline {
    /// Build the pipeline, reading inherited variables from the process
    /// environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or its `[env]`
    /// table does not resolve.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    /// Build the pipeline with an explicit host variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or its `[env]`
    /// table does not resolve.
    pub fn from_config_with<F>(config: &Config, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;

        let build_root = config.build_root();
        let environment = BuildEnvironment::seed(
            &config.install_prefix(),
            &build_root,
            config.build_jobs(),
            &config.build.inherit,
            lookup,
        )
        .with_table(&config.env)?;

        let settings = PipelineSettings {
            build_root,
            download_dir: config.download_dir(),
            log_dir: config.log_dir(),
            shell: config.build.shell.clone(),
            preflight_tools: config.preflight.tools.clone(),
            preflight_paths: config.preflight.paths.clone(),
        };

        Ok(Self {
            stages: Stage::from_configs(&config.stages),
            environment,
            settings,
            handoff: config.handoff.clone(),
        })
    }

    /// Environment a fully successful run ends with
    ///
    /// Exports apply whether a stage runs or is skipped, so this is the
    /// seed environment folded through every stage's exports.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` if an export references an unset name.
    pub fn projected_environment(&self) -> Result<BuildEnvironment, Error> {
        self.stages.iter().try_fold(self.environment.clone(), |env, stage| {
            let config = stage.config();
            env.with_stage_output(stage.name(), &config.exports, &config.prepend)
        })
    }

    /// Resolve the handoff description against a final environment
    ///
    /// A relative script path is taken against the build root.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced variable is not set.
    pub fn handoff(&self, env: &BuildEnvironment) -> Result<Option<Handoff>, Error> {
        let Some(config) = &self.handoff else {
            return Ok(None);
        };
        let mut handoff = Handoff::resolve(config, env)?;
        handoff.script = handoff.script.map(|script| {
            if script.is_relative() {
                self.settings.build_root.join(script)
            } else {
                script
            }
        });
        Ok(Some(handoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::from_toml(
            r#"
[paths]
build_root = "/scratch/build"

[build]
jobs = 6
inherit = ["PATH"]

[env]
CC = "gcc"
CFLAGS = "-O2 -I${PREFIX}/include"

[[stage]]
name = "zlib"
install_marker = "${PREFIX}/lib/libz.a"
"#,
        )
        .unwrap();
        config.base_dir = Some("/work".into());

        let pipeline = Pipeline::from_config_with(&config, |name| {
            (name == "PATH").then(|| "/usr/bin".to_string())
        })
        .unwrap();

        let env = &pipeline.environment;
        assert_eq!(env.get("PATH"), Some("/usr/bin"));
        assert_eq!(env.get("PREFIX"), Some("/scratch/build/install"));
        assert_eq!(env.get("JOBS"), Some("6"));
        assert_eq!(env.get("CFLAGS"), Some("-O2 -I/scratch/build/install/include"));
        assert!(!env.contains("HOME"));
        assert_eq!(pipeline.stages.len(), 1);
        assert_eq!(
            pipeline.settings.log_dir,
            std::path::PathBuf::from("/scratch/build/logs")
        );
    }

    #[test]
    fn test_projected_environment_and_handoff() {
        let mut config = Config::from_toml(
            r#"
[paths]
build_root = "/scratch/build"

[build]
inherit = []

[[stage]]
name = "hdf5"
install_marker = "${PREFIX}/lib/libhdf5.a"
exports = { HDF5_DIR = "${PREFIX}/hdf5" }

[[stage]]
name = "netcdf"
install_marker = "${HDF5_DIR}/../lib/libnetcdf.a"
exports = { NETCDF_DIR = "${PREFIX}/netcdf" }

[handoff]
artifact = "${PREFIX}/bin/model"
vars = ["HDF5_DIR", "NETCDF_DIR"]
script = "model-env.sh"
"#,
        )
        .unwrap();
        config.base_dir = Some("/work".into());

        let pipeline = Pipeline::from_config_with(&config, |_| None).unwrap();
        let env = pipeline.projected_environment().unwrap();
        assert_eq!(env.get("NETCDF_DIR"), Some("/scratch/build/install/netcdf"));

        let handoff = pipeline.handoff(&env).unwrap().unwrap();
        assert_eq!(
            handoff.script,
            Some(std::path::PathBuf::from("/scratch/build/model-env.sh"))
        );
        assert_eq!(handoff.vars.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::default();
        assert!(Pipeline::from_config_with(&config, |_| None).is_err());
    }
}
