//! Build pipeline error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("{stage}: fetch failed for {source_ref}: {message}")]
    FetchFailed {
        stage: String,
        source_ref: String,
        message: String,
    },

    #[error("{stage}: hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        stage: String,
        file: String,
        expected: String,
        actual: String,
    },

    #[error("{stage}: extraction failed: {message}")]
    ExtractionFailed { stage: String, message: String },

    #[error("{stage}: unsupported archive format: {file}")]
    UnsupportedArchiveFormat { stage: String, file: String },

    #[error("{stage}: command `{command}` failed with exit code {}{}", display_code(.exit_code.as_ref()), display_log(.log_path.as_deref()))]
    CommandFailed {
        stage: String,
        command: String,
        exit_code: Option<i32>,
        log_path: Option<String>,
    },

    #[error("{stage}: patch of {file} failed: {message}")]
    PatchFailed {
        stage: String,
        file: String,
        message: String,
    },

    #[error("{stage}: install marker {marker} missing after build")]
    MarkerMissing { stage: String, marker: String },

    #[error("{stage}: refusing to clear existing directory {path} without consent")]
    ConfirmationDeclined { stage: String, path: String },

    #[error("{stage}: precondition failed: {message}")]
    PreconditionFailed { stage: String, message: String },

    #[error("{stage}: undefined variable ${{{name}}} in `{template}`")]
    UndefinedVariable {
        stage: String,
        name: String,
        template: String,
    },
}

fn display_code(code: Option<&i32>) -> String {
    code.map_or_else(|| "none (terminated by signal)".to_string(), ToString::to_string)
}

fn display_log(path: Option<&str>) -> String {
    path.map(|p| format!(" (output: {p})")).unwrap_or_default()
}

impl BuildError {
    /// Name of the stage the error belongs to.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::FetchFailed { stage, .. }
            | Self::HashMismatch { stage, .. }
            | Self::ExtractionFailed { stage, .. }
            | Self::UnsupportedArchiveFormat { stage, .. }
            | Self::CommandFailed { stage, .. }
            | Self::PatchFailed { stage, .. }
            | Self::MarkerMissing { stage, .. }
            | Self::ConfirmationDeclined { stage, .. }
            | Self::PreconditionFailed { stage, .. }
            | Self::UndefinedVariable { stage, .. } => stage,
        }
    }
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::FetchFailed { .. } => {
                Some("Check network access or place the source archive in the download directory.")
            }
            Self::HashMismatch { .. } => {
                Some("Update the checksum in the pipeline file or verify the source URL.")
            }
            Self::ExtractionFailed { .. } | Self::UnsupportedArchiveFormat { .. } => Some(
                "Remove the downloaded archive so it is fetched again, or check the artifact path.",
            ),
            Self::CommandFailed { .. } => {
                Some("Inspect the captured output, fix the cause and re-run; completed stages are skipped.")
            }
            Self::PatchFailed { .. } => {
                Some("Update the patch record so it matches the current sources.")
            }
            Self::MarkerMissing { .. } => {
                Some("Check that the install commands write to the configured prefix.")
            }
            Self::ConfirmationDeclined { .. } => {
                Some("Re-run with --force to allow clearing the directory.")
            }
            Self::PreconditionFailed { .. } => {
                Some("Load the required modules or install the missing tools before re-running.")
            }
            Self::UndefinedVariable { .. } => {
                Some("Define the variable in [env] or export it from an earlier stage.")
            }
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::FetchFailed { .. } => "build.fetch_failed",
            Self::HashMismatch { .. } => "build.hash_mismatch",
            Self::ExtractionFailed { .. } => "build.extraction_failed",
            Self::UnsupportedArchiveFormat { .. } => "build.unsupported_archive_format",
            Self::CommandFailed { .. } => "build.command_failed",
            Self::PatchFailed { .. } => "build.patch_failed",
            Self::MarkerMissing { .. } => "build.marker_missing",
            Self::ConfirmationDeclined { .. } => "build.confirmation_declined",
            Self::PreconditionFailed { .. } => "build.precondition_failed",
            Self::UndefinedVariable { .. } => "build.undefined_variable",
        };
        Some(code)
    }
}
