//! Process execution on the local host

use async_trait::async_trait;
use stackbuild_errors::{Error, PlatformError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{CommandOutput, PlatformCommand, ProcessOperations};

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcess;

impl HostProcess {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn execution_failed(cmd: &PlatformCommand, e: &std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        PlatformError::CommandNotFound {
            command: cmd.program().to_string(),
        }
        .into()
    } else {
        PlatformError::ProcessExecutionFailed {
            command: cmd.to_string(),
            message: e.to_string(),
        }
        .into()
    }
}

async fn open_log(path: &Path) -> Result<std::fs::File, Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(file.into_std().await)
}

#[async_trait]
impl ProcessOperations for HostProcess {
    async fn execute_command(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error> {
        let mut command = Command::new(cmd.program());
        command.args(cmd.get_args()).stdin(Stdio::null());

        if let Some(dir) = cmd.get_current_dir() {
            command.current_dir(dir);
        }

        for (key, value) in cmd.get_env_vars() {
            command.env(key, value);
        }

        if let Some(log_path) = cmd.get_log_file() {
            let stdout = open_log(log_path).await?;
            let stderr = stdout
                .try_clone()
                .map_err(|e| Error::io_with_path(&e, log_path))?;
            command.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));

            let status = command
                .status()
                .await
                .map_err(|e| execution_failed(&cmd, &e))?;

            return Ok(CommandOutput {
                code: status.code(),
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        let output = command
            .output()
            .await
            .map_err(|e| execution_failed(&cmd, &e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn which(&self, program: &str, path: Option<&str>) -> Result<PathBuf, Error> {
        let found = match path {
            Some(search) => {
                let cwd = std::env::current_dir()?;
                which::which_in(program, Some(search), cwd)
            }
            None => which::which(program),
        };
        found.map_err(|_| {
            PlatformError::CommandNotFound {
                command: program.to_string(),
            }
            .into()
        })
    }
}
