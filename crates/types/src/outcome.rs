//! Stage and pipeline outcomes

use serde::{Deserialize, Serialize};
use stackbuild_errors::Error;
use std::fmt;

/// Result of running a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The idempotency check was satisfied; nothing ran
    Skipped,
    /// Every step of the stage completed
    Succeeded,
    /// The stage stopped at its first failing step
    Failed { reason: String },
}

impl StageOutcome {
    /// Whether a later stage may start after this one
    #[must_use]
    pub fn allows_progress(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Short lowercase label used in logs and the status file
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of a whole pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every stage was skipped or succeeded
    Succeeded,
    /// The run halted at `stage`
    Failed { stage: String, error: Error },
}

impl PipelineOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Process exit status matching this outcome
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed { error, .. } => error.exit_code(),
        }
    }
}
