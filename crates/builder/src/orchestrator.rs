//! The build orchestrator
//!
//! Stages run strictly in declaration order. Each stage sees the
//! environment snapshot produced by the stage before it; the first failure
//! halts the run.

use crate::environment::BuildEnvironment;
use crate::extract::extract_archive;
use crate::fetch::{Fetched, Fetcher};
use crate::patch::{apply_patch, PatchOutcome};
use crate::preflight::{self, PIPELINE_SCOPE};
use crate::stage::{ResolvedStage, Stage};
use crate::status_log::StatusLog;
use serde::Serialize;
use stackbuild_config::constants::STATUS_LOG_FILE;
use stackbuild_errors::{BuildError, ConfigError, Error};
use stackbuild_events::{
    AppEvent, EventEmitter, EventSender, FailureContext, PipelineEvent, SkipReason, StageEvent,
};
use stackbuild_net::NetClient;
use stackbuild_platform::{fs, ProcessOperations};
use stackbuild_types::{
    PipelineOutcome, PipelineReport, StageOutcome, StageReport, StatusRecord, Uuid,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Locations and host settings shared by every stage
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub build_root: PathBuf,
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Interpreter for command strings (`<shell> -c <line>`)
    pub shell: String,
    /// Tools every stage needs
    pub preflight_tools: Vec<String>,
    /// Paths every stage needs (templated)
    pub preflight_paths: Vec<String>,
}

impl PipelineSettings {
    /// Settings rooted at `build_root` with the default layout
    #[must_use]
    pub fn under(build_root: &Path) -> Self {
        Self {
            build_root: build_root.to_path_buf(),
            download_dir: build_root.join("downloads"),
            log_dir: build_root.join("logs"),
            shell: "sh".to_string(),
            preflight_tools: Vec::new(),
            preflight_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn status_log(&self) -> StatusLog {
        StatusLog::new(self.log_dir.join(STATUS_LOG_FILE))
    }

    fn command_log(&self, stage: &str, index: usize) -> PathBuf {
        self.log_dir.join(format!("{stage}-{index}.log"))
    }

    fn fetch_log(&self, stage: &str) -> PathBuf {
        self.log_dir.join(format!("{stage}-fetch.log"))
    }
}

/// Per-run switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Consent to clearing existing `clean` directories
    pub force: bool,
}

/// What `plan` expects a stage to do
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum PlannedAction {
    Skip(SkipReason),
    Run {
        /// Sources will be fetched and extracted
        fetch: bool,
        commands: usize,
        patches: usize,
    },
    /// The stage's templates do not resolve; a run would fail here
    Unresolved { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
    pub name: String,
    pub action: PlannedAction,
}

/// How a stage that did not fail ended
enum Disposition {
    Skipped(SkipReason),
    Succeeded,
}

/// Runs stage lists
pub struct Orchestrator {
    settings: PipelineSettings,
    process: Arc<dyn ProcessOperations>,
    client: NetClient,
    events: Option<EventSender>,
}

impl EventEmitter for Orchestrator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        settings: PipelineSettings,
        process: Arc<dyn ProcessOperations>,
        client: NetClient,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            settings,
            process,
            client,
            events,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run `stages` in order against `env`
    ///
    /// Stage failures do not surface as `Err`: they end the run with a
    /// `PipelineOutcome::Failed` report. `Err` is reserved for an empty
    /// stage list.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyPipeline` when `stages` is empty.
    pub async fn run_pipeline(
        &self,
        stages: &[Stage],
        env: BuildEnvironment,
        options: RunOptions,
    ) -> Result<PipelineReport, Error> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyPipeline.into());
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let status_log = self.settings.status_log();
        self.emit(AppEvent::Pipeline(PipelineEvent::Started {
            run_id: run_id.to_string(),
            stage_count: stages.len(),
        }));

        let mut report = PipelineReport {
            run_id,
            stages: Vec::with_capacity(stages.len()),
            outcome: PipelineOutcome::Succeeded,
            environment: env.as_map().clone(),
            duration_ms: 0,
        };

        if let Err(error) = self.pipeline_preflight(&env).await {
            self.record(&status_log, run_id, PIPELINE_SCOPE, &StageOutcome::Failed {
                reason: error.to_string(),
            })
            .await;
            self.halt(&mut report, PIPELINE_SCOPE, stages.len(), error, started);
            return Ok(report);
        }

        let mut env = env;
        let (mut skipped, mut succeeded) = (0usize, 0usize);

        for (position, stage) in stages.iter().enumerate() {
            let name = stage.name().to_string();
            let stage_started = Instant::now();
            let mut commands_run = 0usize;
            self.emit_stage(StageEvent::Started {
                stage: name.clone(),
                index: position,
                total: stages.len(),
            });

            let result = self
                .run_stage(stage, &env, options, &mut commands_run)
                .await;
            let duration = stage_started.elapsed();

            match result {
                Ok((disposition, next_env)) => {
                    let outcome = match disposition {
                        Disposition::Skipped(reason) => {
                            skipped += 1;
                            self.emit_stage(StageEvent::Skipped {
                                stage: name.clone(),
                                reason,
                            });
                            StageOutcome::Skipped
                        }
                        Disposition::Succeeded => {
                            succeeded += 1;
                            self.emit_stage(StageEvent::Succeeded {
                                stage: name.clone(),
                                commands_run,
                                duration,
                            });
                            StageOutcome::Succeeded
                        }
                    };
                    self.record(&status_log, run_id, &name, &outcome).await;
                    report.stages.push(StageReport {
                        name,
                        outcome,
                        commands_run,
                        duration_ms: millis(duration),
                    });
                    env = next_env;
                    report.environment = env.as_map().clone();
                }
                Err(error) => {
                    let outcome = StageOutcome::Failed {
                        reason: error.to_string(),
                    };
                    self.emit_stage(StageEvent::Failed {
                        stage: name.clone(),
                        failure: FailureContext::from_error(&error),
                    });
                    self.record(&status_log, run_id, &name, &outcome).await;
                    report.stages.push(StageReport {
                        name: name.clone(),
                        outcome,
                        commands_run,
                        duration_ms: millis(duration),
                    });
                    self.halt(&mut report, &name, stages.len() - position - 1, error, started);
                    return Ok(report);
                }
            }
        }

        let total = started.elapsed();
        report.duration_ms = millis(total);
        self.emit(AppEvent::Pipeline(PipelineEvent::Completed {
            run_id: run_id.to_string(),
            skipped,
            succeeded,
            duration: total,
        }));
        Ok(report)
    }

    /// Predict what a run would do, without side effects
    ///
    /// Skip decisions reflect the filesystem now; stages after one that
    /// would run are predicted as if it succeeded.
    #[must_use]
    pub fn plan(&self, stages: &[Stage], env: &BuildEnvironment) -> Vec<PlannedStage> {
        let mut env = env.clone();
        let mut planned = Vec::with_capacity(stages.len());

        for stage in stages {
            let action = match stage.resolve(&env, &self.settings.build_root, &self.settings.shell)
            {
                Err(e) => PlannedAction::Unresolved {
                    message: e.to_string(),
                },
                Ok(resolved) => match skip_reason(&resolved) {
                    Some(reason) => PlannedAction::Skip(reason),
                    None => PlannedAction::Run {
                        fetch: resolved.source.is_some()
                            && resolved.artifact.as_ref().is_some_and(|a| !a.exists()),
                        commands: resolved.commands.len(),
                        patches: resolved.patches.len(),
                    },
                },
            };

            let config = stage.config();
            if let Ok(next) = env.with_stage_output(stage.name(), &config.exports, &config.prepend)
            {
                env = next;
            }
            planned.push(PlannedStage {
                name: stage.name().to_string(),
                action,
            });
        }

        planned
    }

    async fn pipeline_preflight(&self, env: &BuildEnvironment) -> Result<(), Error> {
        preflight::check_tools(
            PIPELINE_SCOPE,
            &self.settings.preflight_tools,
            env,
            self.process.as_ref(),
        )?;
        let paths = self
            .settings
            .preflight_paths
            .iter()
            .map(|p| env.substitute(PIPELINE_SCOPE, p).map(PathBuf::from))
            .collect::<Result<Vec<_>, _>>()?;
        preflight::check_paths(PIPELINE_SCOPE, &paths).await
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        env: &BuildEnvironment,
        options: RunOptions,
        commands_run: &mut usize,
    ) -> Result<(Disposition, BuildEnvironment), Error> {
        let config = stage.config();
        let resolved = stage.resolve(env, &self.settings.build_root, &self.settings.shell)?;
        let name = resolved.name.as_str();

        if let Some(reason) = skip_reason(&resolved) {
            let next = env.with_stage_output(name, &config.exports, &config.prepend)?;
            return Ok((Disposition::Skipped(reason), next));
        }

        preflight::check_tools(name, &resolved.requires_tools, env, self.process.as_ref())?;
        preflight::check_paths(name, &resolved.requires_paths).await?;

        if let Some(probe) = &resolved.vendor_check {
            *commands_run += 1;
            if let Some(warning) =
                preflight::vendor_check(probe, &self.settings.shell, env, self.process.as_ref())
                    .await
            {
                self.emit_warning_with_context(warning, name);
            }
        }

        self.clean_guard(&resolved, options).await?;
        self.fetch_and_extract(&resolved, commands_run).await?;

        for patch in &resolved.patches {
            let event = match apply_patch(name, patch, env).await? {
                PatchOutcome::Applied => StageEvent::PatchApplied {
                    stage: name.to_string(),
                    file: patch.file.clone(),
                    already_applied: false,
                },
                PatchOutcome::AlreadyApplied => StageEvent::PatchApplied {
                    stage: name.to_string(),
                    file: patch.file.clone(),
                    already_applied: true,
                },
                PatchOutcome::NotApplicable { reason } => StageEvent::PatchNotApplicable {
                    stage: name.to_string(),
                    file: patch.file.clone(),
                    reason,
                },
            };
            self.emit_stage(event);
        }

        self.run_commands(&resolved, env, commands_run).await?;

        if let Some(marker) = &resolved.install_marker {
            if !fs::exists(marker).await {
                return Err(BuildError::MarkerMissing {
                    stage: name.to_string(),
                    marker: marker.display().to_string(),
                }
                .into());
            }
        }

        let next = env.with_stage_output(name, &config.exports, &config.prepend)?;
        Ok((Disposition::Succeeded, next))
    }

    async fn clean_guard(&self, stage: &ResolvedStage, options: RunOptions) -> Result<(), Error> {
        let Some(dir) = &stage.clean else {
            return Ok(());
        };
        if !fs::exists(dir).await {
            return Ok(());
        }
        if !options.force {
            return Err(BuildError::ConfirmationDeclined {
                stage: stage.name.clone(),
                path: dir.display().to_string(),
            }
            .into());
        }
        fs::remove_dir_all(dir).await?;
        self.emit_stage(StageEvent::DirectoryCleared {
            stage: stage.name.clone(),
            path: dir.clone(),
        });
        Ok(())
    }

    async fn fetch_and_extract(
        &self,
        stage: &ResolvedStage,
        commands_run: &mut usize,
    ) -> Result<(), Error> {
        let (Some(source), Some(artifact)) = (&stage.source, &stage.artifact) else {
            return Ok(());
        };
        let name = stage.name.as_str();

        if fs::exists(artifact).await {
            self.emit_stage(StageEvent::StepReused {
                stage: name.to_string(),
                step: "extract".to_string(),
                path: artifact.clone(),
            });
            return Ok(());
        }

        let fetcher = Fetcher {
            client: &self.client,
            process: self.process.as_ref(),
            download_dir: &self.settings.download_dir,
            events: &self.events,
        };
        let fetched = fetcher
            .fetch(
                name,
                source,
                artifact,
                &self.settings.fetch_log(name),
                commands_run,
            )
            .await?;

        if let Fetched::Archive(archive) = fetched {
            extract_archive(name, &archive, artifact).await?;
            self.emit_stage(StageEvent::Extracted {
                stage: name.to_string(),
                archive,
                destination: artifact.clone(),
            });
        }

        if !fs::exists(artifact).await {
            return Err(BuildError::ExtractionFailed {
                stage: name.to_string(),
                message: format!("{} does not exist after extraction", artifact.display()),
            }
            .into());
        }
        Ok(())
    }

    async fn run_commands(
        &self,
        stage: &ResolvedStage,
        env: &BuildEnvironment,
        commands_run: &mut usize,
    ) -> Result<(), Error> {
        let name = stage.name.as_str();

        for (index, command) in stage.commands.iter().enumerate() {
            let log_path = self.settings.command_log(name, index);
            fs::remove_file(&log_path).await?;

            let mut cmd = command.command.clone();
            cmd.envs(env.iter()).log_to(&log_path);
            let working_dir = command
                .dir
                .clone()
                .unwrap_or_else(|| self.settings.build_root.clone());
            fs::create_dir_all(&working_dir).await?;
            cmd.current_dir(&working_dir);

            self.emit_stage(StageEvent::CommandStarted {
                stage: name.to_string(),
                command: command.display.clone(),
                working_dir,
            });

            let started = Instant::now();
            *commands_run += 1;
            let output = self.process.execute_command(cmd).await?;

            self.emit_stage(StageEvent::CommandCompleted {
                stage: name.to_string(),
                command: command.display.clone(),
                exit_code: output.code,
                duration: started.elapsed(),
                log_path: log_path.clone(),
            });

            if !output.success() {
                return Err(BuildError::CommandFailed {
                    stage: name.to_string(),
                    command: command.display.clone(),
                    exit_code: output.code,
                    log_path: Some(log_path.display().to_string()),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn record(&self, log: &StatusLog, run_id: Uuid, stage: &str, outcome: &StageOutcome) {
        if let Err(e) = log.append(&StatusRecord::new(run_id, stage, outcome)).await {
            self.emit_warning_with_context(
                format!("could not append to {}", log.path().display()),
                e.to_string(),
            );
        }
    }

    fn halt(
        &self,
        report: &mut PipelineReport,
        stage: &str,
        remaining: usize,
        error: Error,
        started: Instant,
    ) {
        self.emit(AppEvent::Pipeline(PipelineEvent::Halted {
            run_id: report.run_id.to_string(),
            stage: stage.to_string(),
            remaining,
            failure: FailureContext::from_error(&error),
        }));
        report.outcome = PipelineOutcome::Failed {
            stage: stage.to_string(),
            error,
        };
        report.duration_ms = millis(started.elapsed());
    }
}

/// Idempotency check: is the stage's work already done?
fn skip_reason(stage: &ResolvedStage) -> Option<SkipReason> {
    if let Some(marker) = &stage.install_marker {
        if marker.exists() {
            return Some(SkipReason::InstallMarker {
                path: marker.clone(),
            });
        }
    }
    if stage.is_fetch_only() {
        if let Some(artifact) = &stage.artifact {
            if artifact.exists() {
                return Some(SkipReason::Artifact {
                    path: artifact.clone(),
                });
            }
        }
    }
    None
}
