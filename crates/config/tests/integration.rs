//! Integration tests for config

#[cfg(test)]
mod tests {
    use stackbuild_config::*;
    use stackbuild_errors::{ConfigError, Error};
    use stackbuild_types::{ColorChoice, OutputFormat};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const PIPELINE: &str = r#"
[general]
default_output = "plain"
color = "never"

[paths]
build_root = "/scratch/build"

[build]
jobs = 4

[env]
HDF5_VERSION = "1.14.3"

[[stage]]
name = "hdf5"
artifact = "${BUILD_ROOT}/hdf5-${HDF5_VERSION}"
install_marker = "${PREFIX}/lib/libhdf5.so"
source = { url = "https://example.org/hdf5-1.14.3.tar.gz", sha256 = "abc" }
commands = ["./configure --prefix=${PREFIX}", "make -j${JOBS}", "make install"]
exports = { HDF5_DIR = "${PREFIX}" }

[[stage.patch]]
file = "src/H5private.h"
before = "old"
after = "new"
when = { var = "HDF5_VERSION", req = ">=1.14, <1.15" }

[[stage]]
name = "netcdf"
install_marker = "${PREFIX}/lib/libnetcdf.so"
workdir = "${BUILD_ROOT}/netcdf"
commands = [{ program = "make", args = ["install"] }]
"#;

    fn clear_env() {
        for var in [
            "STACKBUILD_OUTPUT",
            "STACKBUILD_COLOR",
            "STACKBUILD_JOBS",
            "STACKBUILD_BUILD_ROOT",
            "STACKBUILD_PREFIX",
        ] {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{PIPELINE}").unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.build.jobs, 4);
        assert_eq!(config.build_jobs(), 4);
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0].name, "hdf5");
        assert_eq!(config.stages[0].commands.len(), 3);
        assert_eq!(config.stages[0].patches.len(), 1);
        assert!(matches!(
            config.stages[0].source,
            Some(SourceConfig::Url(ref s)) if s.sha256.as_deref() == Some("abc")
        ));
        assert!(matches!(
            config.stages[1].commands[0],
            CommandConfig::Exec { ref program, .. } if program == "make"
        ));
        assert_eq!(config.base_dir.as_deref(), temp_file.path().parent());
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let result = Config::load_from_file(&PathBuf::from("/nonexistent/stackbuild.toml")).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_unknown_stage_key_rejected() {
        let result = Config::from_toml(
            r#"
[[stage]]
name = "a"
artifact = "x"
comands = ["make"]
"#,
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_default_paths_derive_from_build_root() {
        let mut config = Config::default();
        config.paths.build_root = Some(PathBuf::from("/scratch/build"));

        assert_eq!(config.build_root(), PathBuf::from("/scratch/build"));
        assert_eq!(config.install_prefix(), PathBuf::from("/scratch/build/install"));
        assert_eq!(config.download_dir(), PathBuf::from("/scratch/build/downloads"));
        assert_eq!(config.log_dir(), PathBuf::from("/scratch/build/logs"));
        assert_eq!(
            config.status_log_path(),
            PathBuf::from("/scratch/build/logs/build-status.jsonl")
        );
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let mut config = Config::default();
        config.base_dir = Some(PathBuf::from("/work/project"));
        config.paths.install_prefix = Some(PathBuf::from("opt"));

        assert_eq!(config.build_root(), PathBuf::from("/work/project/build"));
        assert_eq!(config.install_prefix(), PathBuf::from("/work/project/opt"));
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("STACKBUILD_OUTPUT", "json");
        std::env::set_var("STACKBUILD_COLOR", "always");
        std::env::set_var("STACKBUILD_JOBS", "3");
        std::env::set_var("STACKBUILD_PREFIX", "/opt/stack");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.general.color, ColorChoice::Always);
        assert_eq!(config.build.jobs, 3);
        assert_eq!(config.install_prefix(), PathBuf::from("/opt/stack"));

        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("STACKBUILD_JOBS", "many");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { ref field, .. })) if field == "STACKBUILD_JOBS"
        ));

        clear_env();
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::EmptyPipeline))
        ));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut config = Config::default();
        let mut stage = StageConfig::named("zlib");
        stage.install_marker = Some("${PREFIX}/lib/libz.a".to_string());
        config.stages = vec![stage.clone(), stage];

        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::DuplicateStage { ref name })) if name == "zlib"
        ));
    }

    #[test]
    fn test_stage_without_completion_check_rejected() {
        let mut config = Config::default();
        config.stages = vec![StageConfig::named("zlib")];

        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::InvalidStage { ref stage, .. })) if stage == "zlib"
        ));
    }

    #[test]
    fn test_commands_without_install_marker_rejected() {
        let config = Config::from_toml(
            r#"
[[stage]]
name = "croco"
artifact = "croco"
commands = ["make"]
"#,
        )
        .unwrap();

        match config.validate() {
            Err(Error::Config(ConfigError::InvalidStage { stage, message })) => {
                assert_eq!(stage, "croco");
                assert!(message.contains("install_marker"));
            }
            other => panic!("expected InvalidStage, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_patch_requirement_rejected() {
        let config = Config::from_toml(
            r#"
[[stage]]
name = "a"
artifact = "x"

[[stage.patch]]
file = "f"
before = "1"
after = "2"
when = { var = "V", req = "not a version" }
"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::InvalidStage { .. }))
        ));
    }

    #[test]
    fn test_calculate_build_jobs() {
        assert_eq!(calculate_build_jobs(6), 6);
        assert!(calculate_build_jobs(0) >= 1);
    }
}
