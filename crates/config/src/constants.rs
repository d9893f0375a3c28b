//! Fixed names used by stackbuild on disk and in the environment

/// Pipeline file looked up in the working directory when `--config` is absent
pub const LOCAL_PIPELINE_FILE: &str = "stackbuild.toml";

/// Pipeline file name under the user config directory
pub const USER_PIPELINE_FILE: &str = "pipeline.toml";

/// Append-only stage outcome log inside the log directory
pub const STATUS_LOG_FILE: &str = "build-status.jsonl";

/// Variables seeded into every pipeline environment
pub const PREFIX_VAR: &str = "PREFIX";
pub const BUILD_ROOT_VAR: &str = "BUILD_ROOT";
pub const JOBS_VAR: &str = "JOBS";

/// Host variables inherited when `[build] inherit` is not set
pub const DEFAULT_INHERITED_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "LANG",
    "TMPDIR",
    "LD_LIBRARY_PATH",
];

/// Export script written by `env --write` when `[handoff] script` is unset
pub const DEFAULT_HANDOFF_SCRIPT: &str = "stackbuild-env.sh";
