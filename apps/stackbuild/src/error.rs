//! CLI error handling

use std::fmt;

use stackbuild_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Error raised by the orchestrator or its configuration
    Pipeline(stackbuild_errors::Error),
    /// Invalid command arguments or a command the pipeline cannot serve
    InvalidArguments(String),
    /// I/O error while rendering output
    Io(std::io::Error),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(e) => e.exit_code(),
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Pipeline(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Pipeline(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<stackbuild_errors::Error> for CliError {
    fn from(e: stackbuild_errors::Error) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackbuild_errors::BuildError;

    #[test]
    fn test_command_failure_carries_exit_code_and_hint() {
        let err = CliError::from(stackbuild_errors::Error::from(BuildError::CommandFailed {
            stage: "curl".to_string(),
            command: "make".to_string(),
            exit_code: Some(2),
            log_path: Some("/tmp/logs/curl-1.log".to_string()),
        }));

        assert_eq!(err.exit_code(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("Code: build.command_failed"));
        assert!(rendered.contains("Hint:"));
    }

    #[test]
    fn test_argument_errors_exit_with_one() {
        let err = CliError::InvalidArguments("no [handoff] section".to_string());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().starts_with("Invalid arguments"));
    }
}
