//! Report type definitions for pipeline runs

use crate::{PipelineOutcome, StageOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-stage entry of a pipeline report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name
    pub name: String,
    /// What happened
    pub outcome: StageOutcome,
    /// External commands issued by this stage
    pub commands_run: usize,
    /// Wall time spent in the stage
    pub duration_ms: u64,
}

/// Report of one orchestrator run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Identifier shared with the status log
    pub run_id: Uuid,
    /// Stages that were reached, in execution order
    pub stages: Vec<StageReport>,
    /// Overall result
    pub outcome: PipelineOutcome,
    /// Environment snapshot after the last stage that did not fail
    pub environment: BTreeMap<String, String>,
    /// Total execution time
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Look up the report of a stage by name
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Total number of external commands issued during the run
    #[must_use]
    pub fn commands_run(&self) -> usize {
        self.stages.iter().map(|s| s.commands_run).sum()
    }
}

/// One line of the append-only build status log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    /// `skipped`, `succeeded` or `failed`
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusRecord {
    /// Build a record for a stage outcome stamped with the current time
    #[must_use]
    pub fn new(run_id: Uuid, stage: impl Into<String>, outcome: &StageOutcome) -> Self {
        let detail = match outcome {
            StageOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            run_id,
            timestamp: Utc::now(),
            stage: stage.into(),
            outcome: outcome.label().to_string(),
            detail,
        }
    }
}
