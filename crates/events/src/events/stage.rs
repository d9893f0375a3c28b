use crate::FailureContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Why a stage was skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The install marker is already present
    InstallMarker { path: PathBuf },
    /// A fetch-only stage whose artifact already exists
    Artifact { path: PathBuf },
}

/// Pipeline-level lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    Started {
        run_id: String,
        stage_count: usize,
    },

    Completed {
        run_id: String,
        skipped: usize,
        succeeded: usize,
        duration: Duration,
    },

    /// The run halted at `stage`; later stages were not attempted
    Halted {
        run_id: String,
        stage: String,
        remaining: usize,
        failure: FailureContext,
    },
}

/// Events emitted while a single stage runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageEvent {
    Started {
        stage: String,
        index: usize,
        total: usize,
    },

    Skipped {
        stage: String,
        reason: SkipReason,
    },

    /// A sub-step was satisfied by existing output (download-if-absent etc.)
    StepReused {
        stage: String,
        step: String,
        path: PathBuf,
    },

    Extracted {
        stage: String,
        archive: PathBuf,
        destination: PathBuf,
    },

    PatchApplied {
        stage: String,
        file: PathBuf,
        already_applied: bool,
    },

    PatchNotApplicable {
        stage: String,
        file: PathBuf,
        reason: String,
    },

    DirectoryCleared {
        stage: String,
        path: PathBuf,
    },

    CommandStarted {
        stage: String,
        command: String,
        working_dir: PathBuf,
    },

    CommandCompleted {
        stage: String,
        command: String,
        exit_code: Option<i32>,
        duration: Duration,
        log_path: PathBuf,
    },

    Succeeded {
        stage: String,
        commands_run: usize,
        duration: Duration,
    },

    Failed {
        stage: String,
        failure: FailureContext,
    },
}
