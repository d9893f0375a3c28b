//! Integration tests for host process execution

#[cfg(test)]
mod tests {
    use stackbuild_errors::{Error, PlatformError};
    use stackbuild_platform::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let process = HostProcess::new();
        let mut cmd = PlatformCommand::shell("sh", "echo \"$GREETING\"; exit 3");
        cmd.env("GREETING", "hello");

        let output = process.execute_command(cmd).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let temp = tempdir().unwrap();
        let process = HostProcess::new();
        let mut cmd = PlatformCommand::shell("sh", "touch built.txt");
        cmd.current_dir(temp.path());

        let output = process.execute_command(cmd).await.unwrap();
        assert!(output.success());
        assert!(temp.path().join("built.txt").exists());
    }

    #[tokio::test]
    async fn test_log_file_receives_both_streams() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("logs/zlib-0.log");
        let process = HostProcess::new();
        let mut cmd = PlatformCommand::shell("sh", "echo out; echo err >&2");
        cmd.log_to(&log);

        let output = process.execute_command(cmd).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let process = HostProcess::new();
        let result = process
            .execute_command(PlatformCommand::new("stackbuild-no-such-tool"))
            .await;
        assert!(matches!(
            result,
            Err(Error::Platform(PlatformError::CommandNotFound { .. }))
        ));
    }

    #[test]
    fn test_which() {
        let process = HostProcess::new();
        assert!(process.which("sh", None).is_ok());
        assert!(process.which("stackbuild-no-such-tool", None).is_err());
        assert!(process.which("sh", Some("/nonexistent-dir")).is_err());
    }
}
