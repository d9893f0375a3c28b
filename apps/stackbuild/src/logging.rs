//! Structured logging integration for events
//!
//! Converts pipeline events into tracing records with structured fields so
//! `--debug` JSON logs carry the same information the terminal shows.

use stackbuild_events::{
    AppEvent, DownloadEvent, GeneralEvent, PipelineEvent, SkipReason, StageEvent,
};
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` at its level with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::General(general) => log_general(general),
        AppEvent::Pipeline(pipeline) => log_pipeline(pipeline),
        AppEvent::Stage(stage) => log_stage(stage),
        AppEvent::Download(download) => log_download(download),
    }
}

fn log_general(event: &GeneralEvent) {
    match event {
        GeneralEvent::Warning { message, context } => {
            warn!(context = ?context, "{message}");
        }
        GeneralEvent::Error { message, details } => {
            error!(details = ?details, "{message}");
        }
        GeneralEvent::DebugLog { message, context } => {
            debug!(context = ?context, "{message}");
        }
        GeneralEvent::OperationStarted { operation } => {
            info!(operation = %operation, "Operation started");
        }
        GeneralEvent::OperationCompleted { operation, success } => {
            info!(operation = %operation, success = success, "Operation completed");
        }
        GeneralEvent::ConfigurationValidated { source, warnings } => {
            info!(
                source = %source,
                warning_count = warnings.len(),
                "Configuration validated"
            );
        }
    }
}

fn log_pipeline(event: &PipelineEvent) {
    match event {
        PipelineEvent::Started {
            run_id,
            stage_count,
        } => {
            info!(run_id = %run_id, stage_count = stage_count, "Pipeline started");
        }
        PipelineEvent::Completed {
            run_id,
            skipped,
            succeeded,
            duration,
        } => {
            info!(
                run_id = %run_id,
                skipped = skipped,
                succeeded = succeeded,
                duration = ?duration,
                "Pipeline completed"
            );
        }
        PipelineEvent::Halted {
            run_id,
            stage,
            remaining,
            failure,
        } => {
            error!(
                run_id = %run_id,
                stage = %stage,
                remaining = remaining,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Pipeline halted"
            );
        }
    }
}

fn log_stage(event: &StageEvent) {
    match event {
        StageEvent::Started {
            stage,
            index,
            total,
        } => {
            info!(stage = %stage, index = index, total = total, "Stage started");
        }
        StageEvent::Skipped { stage, reason } => {
            let (reason, path) = match reason {
                SkipReason::InstallMarker { path } => ("install_marker", path),
                SkipReason::Artifact { path } => ("artifact", path),
            };
            info!(stage = %stage, reason = reason, path = %path.display(), "Stage skipped");
        }
        StageEvent::StepReused { stage, step, path } => {
            debug!(stage = %stage, step = %step, path = %path.display(), "Reusing existing output");
        }
        StageEvent::Extracted {
            stage,
            archive,
            destination,
        } => {
            info!(
                stage = %stage,
                archive = %archive.display(),
                destination = %destination.display(),
                "Archive extracted"
            );
        }
        StageEvent::PatchApplied {
            stage,
            file,
            already_applied,
        } => {
            info!(
                stage = %stage,
                file = %file.display(),
                already_applied = already_applied,
                "Patch applied"
            );
        }
        StageEvent::PatchNotApplicable {
            stage,
            file,
            reason,
        } => {
            warn!(stage = %stage, file = %file.display(), reason = %reason, "Patch not applicable");
        }
        StageEvent::DirectoryCleared { stage, path } => {
            info!(stage = %stage, path = %path.display(), "Directory cleared");
        }
        StageEvent::CommandStarted {
            stage,
            command,
            working_dir,
        } => {
            debug!(
                stage = %stage,
                command = %command,
                working_dir = %working_dir.display(),
                "Command started"
            );
        }
        StageEvent::CommandCompleted {
            stage,
            command,
            exit_code,
            duration,
            log_path,
        } => {
            debug!(
                stage = %stage,
                command = %command,
                exit_code = ?exit_code,
                duration = ?duration,
                log = %log_path.display(),
                "Command completed"
            );
        }
        StageEvent::Succeeded {
            stage,
            commands_run,
            duration,
        } => {
            info!(
                stage = %stage,
                commands_run = commands_run,
                duration = ?duration,
                "Stage succeeded"
            );
        }
        StageEvent::Failed { stage, failure } => {
            error!(
                stage = %stage,
                retryable = failure.retryable,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Stage failed"
            );
        }
    }
}

fn log_download(event: &DownloadEvent) {
    match event {
        DownloadEvent::Started {
            url,
            stage,
            total_size,
        } => {
            info!(url = %url, stage = %stage, total_size = ?total_size, "Download started");
        }
        DownloadEvent::Completed {
            url,
            stage,
            path,
            final_size,
            total_time,
        } => {
            info!(
                url = %url,
                stage = %stage,
                path = %path.display(),
                final_size = final_size,
                duration = ?total_time,
                "Download completed"
            );
        }
        DownloadEvent::Failed { url, stage, error } => {
            error!(url = %url, stage = %stage, error = %error, "Download failed");
        }
    }
}
