//! Integration tests for error types

#[cfg(test)]
mod tests {
    use stackbuild_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::Timeout {
            url: "https://example.com".into(),
        };
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_command_failed_display() {
        let err = BuildError::CommandFailed {
            stage: "hdf5".into(),
            command: "make install".into(),
            exit_code: Some(2),
            log_path: Some("/scratch/logs/hdf5-2.log".into()),
        };
        assert_eq!(
            err.to_string(),
            "hdf5: command `make install` failed with exit code 2 (output: /scratch/logs/hdf5-2.log)"
        );
        assert_eq!(err.stage(), "hdf5");
    }

    #[test]
    fn test_exit_code_propagation() {
        let err: Error = BuildError::CommandFailed {
            stage: "zlib".into(),
            command: "make".into(),
            exit_code: Some(2),
            log_path: None,
        }
        .into();
        assert_eq!(err.exit_code(), 2);

        let err: Error = BuildError::ConfirmationDeclined {
            stage: "croco".into(),
            path: "/scratch/croco".into(),
        }
        .into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_user_facing_codes() {
        let err: Error = BuildError::PreconditionFailed {
            stage: "netcdf-c".into(),
            message: "missing tool mpicc".into(),
        }
        .into();
        assert_eq!(err.user_code(), Some("build.precondition_failed"));
        assert!(err.user_hint().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }
}
