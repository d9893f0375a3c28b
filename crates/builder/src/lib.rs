#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency build orchestration for stackbuild
//!
//! This crate runs an ordered list of stages (fetch, extract, patch,
//! configure, compile, install), skipping work whose output already exists,
//! threading an environment snapshot from stage to stage and halting at the
//! first failure.

mod environment;
mod extract;
mod fetch;
mod handoff;
mod orchestrator;
mod patch;
mod pipeline;
mod preflight;
mod stage;
mod status_log;

pub use environment::BuildEnvironment;
pub use extract::{extract_archive, ArchiveFormat};
pub use fetch::{verify_checksum, Checksum, Fetched, Fetcher};
pub use handoff::{Handoff, ARTIFACT_VAR};
pub use orchestrator::{
    Orchestrator, PipelineSettings, PlannedAction, PlannedStage, RunOptions,
};
pub use patch::{apply_patch, evaluate_condition, parse_lenient_version, PatchOutcome};
pub use pipeline::Pipeline;
pub use preflight::{check_paths, check_tools, vendor_check, PIPELINE_SCOPE};
pub use stage::{
    ResolvedCommand, ResolvedPatch, ResolvedSource, ResolvedStage, Stage, VendorProbe,
};
pub use status_log::{latest_per_stage, StatusLog};
