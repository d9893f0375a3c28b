//! Output rendering and formatting

use crate::events::format_duration;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::Term;
use serde_json::json;
use stackbuild_builder::{Handoff, PlannedAction, PlannedStage};
use stackbuild_errors::UserFacingError;
use stackbuild_events::SkipReason;
use stackbuild_types::{ColorChoice, PipelineOutcome, PipelineReport, StageOutcome, StatusRecord};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render the report of a finished run
    pub fn render_report(&self, report: &PipelineReport) -> io::Result<()> {
        if self.json_output {
            return print_json(report);
        }

        let mut table = self.table(&["Stage", "Outcome", "Commands", "Time"]);
        for stage in &report.stages {
            table.add_row(vec![
                Cell::new(&stage.name),
                self.outcome_cell(&stage.outcome),
                Cell::new(stage.commands_run),
                Cell::new(format_duration(Duration::from_millis(stage.duration_ms))),
            ]);
        }
        println!("{table}");

        match &report.outcome {
            PipelineOutcome::Succeeded => {
                println!(
                    "Completed in {}",
                    format_duration(Duration::from_millis(report.duration_ms))
                );
            }
            PipelineOutcome::Failed { stage, error } => {
                println!("Failed at {stage}: {}", error.user_message());
                if let Some(hint) = error.user_hint() {
                    println!("Hint: {hint}");
                }
            }
        }
        Ok(())
    }

    /// Render a dry-run plan
    pub fn render_plan(&self, plan: &[PlannedStage]) -> io::Result<()> {
        if self.json_output {
            return print_json(&plan);
        }

        let mut table = self.table(&["Stage", "Action", "Detail"]);
        for stage in plan {
            let (action, color, detail) = match &stage.action {
                PlannedAction::Skip(SkipReason::InstallMarker { path }) => (
                    "skip",
                    Color::Green,
                    format!("{} is present", path.display()),
                ),
                PlannedAction::Skip(SkipReason::Artifact { path }) => {
                    ("skip", Color::Green, format!("{} exists", path.display()))
                }
                PlannedAction::Run {
                    fetch,
                    commands,
                    patches,
                } => {
                    let mut parts = Vec::new();
                    if *fetch {
                        parts.push("fetch".to_string());
                    }
                    if *patches > 0 {
                        parts.push(format!("{patches} patches"));
                    }
                    parts.push(format!("{commands} commands"));
                    ("run", Color::Yellow, parts.join(", "))
                }
                PlannedAction::Unresolved { message } => ("blocked", Color::Red, message.clone()),
            };
            table.add_row(vec![
                Cell::new(&stage.name),
                self.colored(Cell::new(action), color),
                Cell::new(detail),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    /// Render the latest status-log record per stage
    pub fn render_status(&self, records: &[StatusRecord], log_path: &Path) -> io::Result<()> {
        if self.json_output {
            return print_json(&records);
        }

        if records.is_empty() {
            println!("No runs recorded in {}", log_path.display());
            return Ok(());
        }

        let mut table = self.table(&["Stage", "Outcome", "When", "Detail"]);
        for record in records {
            let color = match record.outcome.as_str() {
                "failed" => Color::Red,
                "succeeded" => Color::Green,
                _ => Color::Reset,
            };
            table.add_row(vec![
                Cell::new(&record.stage),
                self.colored(Cell::new(&record.outcome), color),
                Cell::new(record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::new(record.detail.as_deref().unwrap_or("")),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    /// Render the handoff script, or where it was written
    pub fn render_handoff(&self, handoff: &Handoff, written: Option<&Path>) -> io::Result<()> {
        if self.json_output {
            let value = json!({
                "artifact": handoff.artifact,
                "vars": handoff.vars,
                "script": written,
            });
            return print_json(&value);
        }

        match written {
            Some(path) => {
                println!("Wrote {}", path.display());
                println!("Artifact: {}", handoff.artifact.display());
            }
            None => print!("{}", handoff.render_script()),
        }
        Ok(())
    }

    fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
        if !self.supports_color() {
            table.force_no_tty();
        }
        table
    }

    fn outcome_cell(&self, outcome: &StageOutcome) -> Cell {
        let color = match outcome {
            StageOutcome::Skipped => Color::Reset,
            StageOutcome::Succeeded => Color::Green,
            StageOutcome::Failed { .. } => Color::Red,
        };
        self.colored(Cell::new(outcome.label()), color)
    }

    fn colored(&self, cell: Cell, color: Color) -> Cell {
        if self.supports_color() {
            cell.fg(color)
        } else {
            cell
        }
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}
