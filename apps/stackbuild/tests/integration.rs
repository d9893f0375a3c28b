//! Integration tests for the stackbuild CLI

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

const PIPELINE: &str = r#"
[paths]
build_root = "build"

[build]
jobs = 2
inherit = ["PATH"]

[env]
CFLAGS = "-O2 -I${PREFIX}/include"

[[stage]]
name = "zlib"
workdir = "src/zlib"
install_marker = "${PREFIX}/lib/libz.a"
commands = [
    "mkdir -p ${PREFIX}/lib",
    "touch ${PREFIX}/lib/libz.a",
]
exports = { ZLIB_DIR = "${PREFIX}" }

[[stage]]
name = "model"
workdir = "src/model"
install_marker = "${PREFIX}/bin/model"
commands = [
    "echo ${ZLIB_DIR} > zlib-dir.txt",
    "mkdir -p ${PREFIX}/bin && touch ${PREFIX}/bin/model",
]

[handoff]
artifact = "${PREFIX}/bin/model"
vars = ["ZLIB_DIR"]
script = "model-env.sh"
"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new(pipeline: &str) -> Self {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("stackbuild.toml"), pipeline).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("stackbuild.toml")
    }

    fn build(&self) -> PathBuf {
        self.dir.path().join("build")
    }

    fn stackbuild(&self, args: &[&str]) -> Output {
        let config = self.config();
        Command::new(env!("CARGO_BIN_EXE_stackbuild"))
            .arg("--config")
            .arg(&config)
            .arg("--color")
            .arg("never")
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute stackbuild")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_stackbuild"))
        .arg("--version")
        .output()
        .expect("Failed to execute stackbuild");

    assert!(output.status.success());
    assert!(stdout(&output).contains("stackbuild"));
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_stackbuild"))
        .arg("--help")
        .output()
        .expect("Failed to execute stackbuild");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Idempotent dependency build orchestrator"));
    for command in ["run", "plan", "status", "env"] {
        assert!(text.contains(command), "help lists {command}");
    }
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_stackbuild"))
        .arg("invalid-command")
        .output()
        .expect("Failed to execute stackbuild");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unrecognized subcommand"));
}

#[test]
fn test_missing_config_file() {
    let project = Project::new(PIPELINE);
    let output = Command::new(env!("CARGO_BIN_EXE_stackbuild"))
        .args(["--config", "/nonexistent/stackbuild.toml", "plan"])
        .current_dir(project.dir.path())
        .output()
        .expect("Failed to execute stackbuild");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_run_then_rerun_skips() {
    let project = Project::new(PIPELINE);

    let first = project.stackbuild(&["--json", "run"]);
    assert!(first.status.success(), "{}", stderr(&first));
    let report = json(&first);
    assert_eq!(report["outcome"]["outcome"], "succeeded");
    assert_eq!(report["stages"][1]["outcome"]["outcome"], "succeeded");

    let prefix = project.build().join("install");
    assert_eq!(
        std::fs::read_to_string(project.build().join("src/model/zlib-dir.txt"))
            .unwrap()
            .trim(),
        prefix.display().to_string()
    );

    let second = project.stackbuild(&["--json", "run"]);
    assert!(second.status.success());
    let report = json(&second);
    let outcomes: Vec<_> = report["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["outcome"]["outcome"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(outcomes, ["skipped", "skipped"]);
    assert_eq!(report["stages"][0]["commands_run"], 0);
}

#[test]
fn test_failing_command_sets_exit_status() {
    let project = Project::new(
        r#"
[paths]
build_root = "build"

[[stage]]
name = "first"
workdir = "src/first"
install_marker = "${PREFIX}/first.ok"
commands = ["mkdir -p ${PREFIX}", "touch ${PREFIX}/first.ok"]

[[stage]]
name = "broken"
workdir = "src/broken"
install_marker = "${PREFIX}/broken.ok"
commands = ["echo 'fatal: compiler not found' >&2; exit 7"]

[[stage]]
name = "never"
workdir = "src/never"
install_marker = "${PREFIX}/never.ok"
commands = ["touch ${PREFIX}/never.ok"]
"#,
    );

    let output = project.stackbuild(&["run"]);

    assert_eq!(output.status.code(), Some(7));
    assert!(stdout(&output).contains("Failed at broken"));
    assert!(!exists(&project.build().join("install/never.ok")));
    let log = std::fs::read_to_string(project.build().join("logs/broken-0.log")).unwrap();
    assert!(log.contains("compiler not found"));

    let status = project.stackbuild(&["--json", "status"]);
    assert!(status.status.success());
    let records = json(&status);
    let summary: Vec<_> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["stage"].as_str().unwrap().to_string(),
                r["outcome"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        [
            ("first".to_string(), "succeeded".to_string()),
            ("broken".to_string(), "failed".to_string())
        ]
    );
}

#[test]
fn test_clean_requires_force_flag() {
    let project = Project::new(
        r#"
[paths]
build_root = "build"

[[stage]]
name = "hdf5"
workdir = "hdf5-build"
install_marker = "${PREFIX}/hdf5.ok"
clean = "${BUILD_ROOT}/hdf5-build"
commands = ["mkdir -p ${PREFIX}", "touch ${PREFIX}/hdf5.ok"]
"#,
    );
    let stale = project.build().join("hdf5-build/CMakeCache.txt");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"stale").unwrap();

    let declined = project.stackbuild(&["run"]);
    assert_eq!(declined.status.code(), Some(1));
    assert!(stdout(&declined).contains("--force"));
    assert!(exists(&stale));

    let forced = project.stackbuild(&["run", "--force"]);
    assert!(forced.status.success(), "{}", stderr(&forced));
    assert!(!exists(&stale));
}

#[test]
fn test_plan_reports_without_running() {
    let project = Project::new(PIPELINE);

    let output = project.stackbuild(&["--json", "plan"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let plan = json(&output);
    assert_eq!(plan[0]["name"], "zlib");
    assert_eq!(plan[0]["action"]["action"], "run");
    assert_eq!(plan[0]["action"]["detail"]["commands"], 2);
    assert!(!exists(&project.build()));
}

#[test]
fn test_env_requires_built_artifact() {
    let project = Project::new(PIPELINE);

    let before = project.stackbuild(&["env"]);
    assert_eq!(before.status.code(), Some(1));

    assert!(project.stackbuild(&["run"]).status.success());

    let printed = project.stackbuild(&["env"]);
    assert!(printed.status.success(), "{}", stderr(&printed));
    let script = stdout(&printed);
    assert!(script.contains("export ZLIB_DIR="));
    assert!(script.contains("export STACKBUILD_ARTIFACT="));

    let written = project.stackbuild(&["env", "--write"]);
    assert!(written.status.success());
    assert!(exists(&project.build().join("model-env.sh")));
}
