//! Event handling and terminal progress display

use crate::logging::log_event_with_tracing;
use console::{style, Term};
use stackbuild_events::{
    AppEvent, DownloadEvent, FailureContext, GeneralEvent, PipelineEvent, SkipReason, StageEvent,
};
use std::time::Duration;

/// Renders pipeline events as they arrive
pub struct EventHandler {
    term: Term,
    colors_enabled: bool,
    /// Show per-command detail and debug messages
    verbose: bool,
    /// Suppress terminal output (JSON mode); events are still logged
    quiet: bool,
}

impl EventHandler {
    pub fn new(colors_enabled: bool, verbose: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            colors_enabled,
            verbose,
            quiet,
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        log_event_with_tracing(&event);
        if self.quiet {
            return;
        }
        if let Some(line) = self.render(&event) {
            let _ = self.term.write_line(&line);
        }
    }

    /// Terminal line for an event, if it is shown at the current verbosity
    fn render(&self, event: &AppEvent) -> Option<String> {
        match event {
            AppEvent::General(general) => self.render_general(general),
            AppEvent::Pipeline(pipeline) => Some(self.render_pipeline(pipeline)),
            AppEvent::Stage(stage) => self.render_stage(stage),
            AppEvent::Download(download) => Some(self.render_download(download)),
        }
    }

    fn render_general(&self, event: &GeneralEvent) -> Option<String> {
        match event {
            GeneralEvent::Warning { message, context } => Some(match context {
                Some(context) => format!("{} {message} ({context})", self.paint_warn("warning:")),
                None => format!("{} {message}", self.paint_warn("warning:")),
            }),
            GeneralEvent::Error { message, details } => Some(match details {
                Some(details) => format!("{} {message}: {details}", self.paint_err("error:")),
                None => format!("{} {message}", self.paint_err("error:")),
            }),
            GeneralEvent::DebugLog { message, .. } if self.verbose => {
                Some(self.paint_dim(&format!("debug: {message}")))
            }
            _ => None,
        }
    }

    fn render_pipeline(&self, event: &PipelineEvent) -> String {
        match event {
            PipelineEvent::Started { stage_count, .. } => {
                format!("Running pipeline ({stage_count} stages)")
            }
            PipelineEvent::Completed {
                skipped,
                succeeded,
                duration,
                ..
            } => format!(
                "{} {succeeded} built, {skipped} already up to date ({})",
                self.paint_ok("Pipeline complete:"),
                format_duration(*duration)
            ),
            PipelineEvent::Halted {
                stage,
                remaining,
                failure,
                ..
            } => {
                let mut line = format!(
                    "{} halted at {stage}; {remaining} later stage(s) not attempted",
                    self.paint_err("Pipeline failed:")
                );
                push_failure(&mut line, failure);
                line
            }
        }
    }

    fn render_stage(&self, event: &StageEvent) -> Option<String> {
        match event {
            StageEvent::Started {
                stage,
                index,
                total,
            } => Some(format!(
                "[{}/{total}] {}",
                index + 1,
                self.paint_bold(stage)
            )),
            StageEvent::Skipped { reason, .. } => {
                let detail = match reason {
                    SkipReason::InstallMarker { path } => {
                        format!("{} is present", path.display())
                    }
                    SkipReason::Artifact { path } => format!("{} exists", path.display()),
                };
                Some(format!("  {} ({detail})", self.paint_dim("up to date")))
            }
            StageEvent::StepReused { step, path, .. } if self.verbose => Some(self.paint_dim(
                &format!("  reusing {step} output {}", path.display()),
            )),
            StageEvent::Extracted { destination, .. } => {
                Some(format!("  extracted to {}", destination.display()))
            }
            StageEvent::PatchApplied {
                file,
                already_applied,
                ..
            } => Some(if *already_applied {
                self.paint_dim(&format!("  patch already present in {}", file.display()))
            } else {
                format!("  patched {}", file.display())
            }),
            StageEvent::PatchNotApplicable { file, reason, .. } => Some(format!(
                "  {} patch for {} skipped: {reason}",
                self.paint_warn("note:"),
                file.display()
            )),
            StageEvent::DirectoryCleared { path, .. } => {
                Some(format!("  cleared {}", path.display()))
            }
            StageEvent::CommandStarted { command, .. } => {
                Some(self.paint_dim(&format!("  $ {command}")))
            }
            StageEvent::CommandCompleted {
                exit_code,
                duration,
                log_path,
                ..
            } if self.verbose => Some(self.paint_dim(&format!(
                "    exit {} after {} (log: {})",
                exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                format_duration(*duration),
                log_path.display()
            ))),
            StageEvent::Succeeded {
                commands_run,
                duration,
                ..
            } => Some(format!(
                "  {} ({commands_run} commands, {})",
                self.paint_ok("done"),
                format_duration(*duration)
            )),
            StageEvent::Failed { failure, .. } => {
                Some(format!("  {} {}", self.paint_err("failed:"), failure.message))
            }
            _ => None,
        }
    }

    fn render_download(&self, event: &DownloadEvent) -> String {
        match event {
            DownloadEvent::Started {
                url, total_size, ..
            } => match total_size {
                Some(size) => format!("  downloading {url} ({})", format_size(*size)),
                None => format!("  downloading {url}"),
            },
            DownloadEvent::Completed {
                final_size,
                total_time,
                ..
            } => self.paint_dim(&format!(
                "  downloaded {} in {}",
                format_size(*final_size),
                format_duration(*total_time)
            )),
            DownloadEvent::Failed { url, error, .. } => {
                format!("  {} {url}: {error}", self.paint_err("download failed:"))
            }
        }
    }

    fn paint_ok(&self, text: &str) -> String {
        if self.colors_enabled {
            style(text).green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_warn(&self, text: &str) -> String {
        if self.colors_enabled {
            style(text).yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_err(&self, text: &str) -> String {
        if self.colors_enabled {
            style(text).red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_bold(&self, text: &str) -> String {
        if self.colors_enabled {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_dim(&self, text: &str) -> String {
        if self.colors_enabled {
            style(text).dim().to_string()
        } else {
            text.to_string()
        }
    }
}

fn push_failure(line: &mut String, failure: &FailureContext) {
    line.push_str("\n  ");
    line.push_str(&failure.message);
    if let Some(code) = &failure.code {
        line.push_str("\n  Code: ");
        line.push_str(code);
    }
    if let Some(hint) = &failure.hint {
        line.push_str("\n  Hint: ");
        line.push_str(hint);
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
