use serde::{Deserialize, Serialize};

use stackbuild_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether re-running might succeed without changes.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod download;
pub mod general;
pub mod stage;

pub use download::*;
pub use general::*;
pub use stage::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Whole-run lifecycle
    Pipeline(PipelineEvent),

    /// Per-stage progress (skips, commands, patches)
    Stage(StageEvent),

    /// Source archive downloads
    Download(DownloadEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::Pipeline(PipelineEvent::Halted { .. })
            | Self::Stage(StageEvent::Failed { .. })
            | Self::Download(DownloadEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Stage(StageEvent::PatchNotApplicable { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Stage(
                StageEvent::CommandStarted { .. }
                | StageEvent::CommandCompleted { .. }
                | StageEvent::StepReused { .. },
            ) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "stackbuild::events::general",
            Self::Pipeline(_) => "stackbuild::events::pipeline",
            Self::Stage(_) => "stackbuild::events::stage",
            Self::Download(_) => "stackbuild::events::download",
        }
    }
}
