//! Preconditions checked before a stage has any side effect

use crate::environment::BuildEnvironment;
use crate::stage::VendorProbe;
use stackbuild_errors::{BuildError, Error};
use stackbuild_platform::{fs, PlatformCommand, ProcessOperations};
use std::path::PathBuf;

/// Scope name used for pipeline-wide checks
pub const PIPELINE_SCOPE: &str = "preflight";

/// Resolve every tool on the environment's `PATH`
///
/// # Errors
///
/// Returns `PreconditionFailed` listing every missing tool.
pub fn check_tools(
    scope: &str,
    tools: &[String],
    env: &BuildEnvironment,
    process: &dyn ProcessOperations,
) -> Result<Vec<PathBuf>, Error> {
    let search = env.get("PATH");
    let mut found = Vec::with_capacity(tools.len());
    let mut missing = Vec::new();
    for tool in tools {
        match process.which(tool, search) {
            Ok(path) => found.push(path),
            Err(_) => missing.push(tool.as_str()),
        }
    }

    if missing.is_empty() {
        Ok(found)
    } else {
        Err(BuildError::PreconditionFailed {
            stage: scope.to_string(),
            message: format!("required tools not found on PATH: {}", missing.join(", ")),
        }
        .into())
    }
}

/// Check that every path exists
///
/// # Errors
///
/// Returns `PreconditionFailed` listing every missing path.
pub async fn check_paths(scope: &str, paths: &[PathBuf]) -> Result<(), Error> {
    let mut missing = Vec::new();
    for path in paths {
        if !fs::exists(path).await {
            missing.push(path.display().to_string());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(BuildError::PreconditionFailed {
            stage: scope.to_string(),
            message: format!("required paths missing: {}", missing.join(", ")),
        }
        .into())
    }
}

/// Run a vendor probe
///
/// Returns a warning message when the probe fails or its output lacks the
/// expected text; `None` means the toolchain matched. Never fails the stage.
pub async fn vendor_check(
    probe: &VendorProbe,
    shell: &str,
    env: &BuildEnvironment,
    process: &dyn ProcessOperations,
) -> Option<String> {
    let mut cmd = PlatformCommand::shell(shell, &probe.command);
    cmd.envs(env.iter());

    match process.execute_command(cmd).await {
        Ok(output) if output.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains(&probe.contains) || stderr.contains(&probe.contains) {
                None
            } else {
                Some(format!(
                    "`{}` does not report `{}`; the toolchain may not be the expected one",
                    probe.command, probe.contains
                ))
            }
        }
        Ok(output) => Some(format!(
            "`{}` exited with {:?}; toolchain identity unknown",
            probe.command, output.code
        )),
        Err(e) => Some(format!("`{}` could not run: {e}", probe.command)),
    }
}
