//! Process execution seam

mod host;

pub use host::HostProcess;

use async_trait::async_trait;
use stackbuild_errors::Error;
use std::fmt;
use std::path::{Path, PathBuf};

/// Command builder handed to a [`ProcessOperations`] implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    log_file: Option<PathBuf>,
}

impl PlatformCommand {
    /// Create a new platform command
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            log_file: None,
        }
    }

    /// A command line run through `shell -c`
    #[must_use]
    pub fn shell(shell: &str, line: &str) -> Self {
        let mut cmd = Self::new(shell);
        cmd.arg("-c").arg(line);
        cmd
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable on top of the inherited environment
    pub fn env<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set several environment variables
    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.push((key.into(), value.into()));
        }
        self
    }

    /// Append stdout and stderr to `path` instead of capturing them
    pub fn log_to<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.log_file = Some(path.into());
        self
    }

    /// Get the program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the arguments
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the current directory
    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Get the extra environment variables
    #[must_use]
    pub fn get_env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Get the log file, if output is redirected
    #[must_use]
    pub fn get_log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

impl fmt::Display for PlatformCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Output from command execution
///
/// `stdout` and `stderr` are empty when output went to a log file.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait for process execution operations
#[async_trait]
pub trait ProcessOperations: Send + Sync {
    /// Execute a command and wait for it to finish
    ///
    /// A non-zero exit is reported through [`CommandOutput::code`], not as
    /// an error; errors mean the process could not be run at all.
    async fn execute_command(&self, cmd: PlatformCommand) -> Result<CommandOutput, Error>;

    /// Find the path to an executable, searching `path` (a `PATH`-style
    /// list) or the process `PATH` when `None`
    fn which(&self, program: &str, path: Option<&str>) -> Result<PathBuf, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let mut cmd = PlatformCommand::new("make");
        cmd.arg("-j4")
            .args(["install", "DESTDIR=/tmp/stage"])
            .current_dir("/src/zlib")
            .env("CC", "gcc");

        assert_eq!(cmd.program(), "make");
        assert_eq!(cmd.get_args(), ["-j4", "install", "DESTDIR=/tmp/stage"]);
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/src/zlib")));
        assert_eq!(cmd.get_env_vars(), [("CC".to_string(), "gcc".to_string())]);
        assert_eq!(cmd.get_log_file(), None);
    }

    #[test]
    fn test_shell_display() {
        let cmd = PlatformCommand::shell("sh", "make -j4 install");
        assert_eq!(cmd.to_string(), "sh -c 'make -j4 install'");
    }

    #[test]
    fn test_output_success() {
        let ok = CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        };
        let failed = CommandOutput {
            code: Some(2),
            ..CommandOutput::default()
        };
        let killed = CommandOutput::default();
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }
}
