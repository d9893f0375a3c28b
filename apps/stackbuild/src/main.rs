//! stackbuild - Idempotent dependency build orchestrator
//!
//! Loads the pipeline file, wires the orchestrator to the host process
//! runner and HTTP client, and renders events and reports.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use stackbuild_builder::{Orchestrator, Pipeline, RunOptions};
use stackbuild_config::{constants::DEFAULT_HANDOFF_SCRIPT, Config};
use stackbuild_events::{EventReceiver, EventSender};
use stackbuild_net::{NetClient, NetConfig};
use stackbuild_platform::HostProcess;
use stackbuild_types::{ColorChoice, OutputFormat, PipelineReport};
use std::path::Path;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic; returns the process exit status
async fn run(cli: Cli) -> Result<i32, CliError> {
    // 1. File config (or defaults), 2. environment, 3. CLI flags
    let mut config = Config::load_or_discover(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);
    let json_output = cli.global.json || config.general.default_output == OutputFormat::Json;

    init_tracing(json_output, cli.global.debug, &config.log_dir());
    info!(
        command = cli.command.name(),
        "Starting stackbuild v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pipeline = Pipeline::from_config(&config)?;
    let renderer = OutputRenderer::new(json_output, config.general.color);

    match cli.command {
        Commands::Run { force } => {
            let (event_sender, event_receiver) = stackbuild_events::channel();
            let orchestrator = build_orchestrator(&config, &pipeline, Some(event_sender))?;
            let colors_enabled = match config.general.color {
                ColorChoice::Always => true,
                ColorChoice::Never => false,
                ColorChoice::Auto => console::Term::stderr().features().colors_supported(),
            };
            let mut event_handler =
                EventHandler::new(colors_enabled, cli.global.debug, json_output);

            let report = run_with_events(
                &orchestrator,
                &pipeline,
                RunOptions { force },
                event_receiver,
                &mut event_handler,
            )
            .await?;

            renderer.render_report(&report)?;
            info!(outcome = ?report.outcome, "Run finished");
            Ok(report.outcome.exit_code())
        }

        Commands::Plan => {
            let orchestrator = build_orchestrator(&config, &pipeline, None)?;
            let plan = orchestrator.plan(&pipeline.stages, &pipeline.environment);
            renderer.render_plan(&plan)?;
            Ok(0)
        }

        Commands::Status => {
            let status_log = pipeline.settings.status_log();
            let records = status_log.latest_per_stage().await?;
            renderer.render_status(&records, status_log.path())?;
            Ok(0)
        }

        Commands::Env { write } => {
            let env = pipeline.projected_environment()?;
            let Some(handoff) = pipeline.handoff(&env)? else {
                return Err(CliError::InvalidArguments(
                    "the pipeline file has no [handoff] section".to_string(),
                ));
            };
            handoff.verify()?;

            if write {
                let path = handoff
                    .script
                    .clone()
                    .unwrap_or_else(|| pipeline.settings.build_root.join(DEFAULT_HANDOFF_SCRIPT));
                handoff.write_script(&path).await?;
                renderer.render_handoff(&handoff, Some(&path))?;
            } else {
                renderer.render_handoff(&handoff, None)?;
            }
            Ok(0)
        }
    }
}

fn build_orchestrator(
    config: &Config,
    pipeline: &Pipeline,
    events: Option<EventSender>,
) -> Result<Orchestrator, CliError> {
    let client = NetClient::new(&NetConfig::with_timeouts(
        config.network.timeout,
        config.network.connect_timeout,
    ))?;
    Ok(Orchestrator::new(
        pipeline.settings.clone(),
        Arc::new(HostProcess::new()),
        client,
        events,
    ))
}

/// Run the pipeline while rendering its events
async fn run_with_events(
    orchestrator: &Orchestrator,
    pipeline: &Pipeline,
    options: RunOptions,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<PipelineReport, CliError> {
    let mut run_future = Box::pin(orchestrator.run_pipeline(
        &pipeline.stages,
        pipeline.environment.clone(),
        options,
    ));

    loop {
        select! {
            result = &mut run_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return Ok(result?);
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    event_handler.handle_event(event);
                }
            }
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, log_dir: &Path) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }
        let log_file = log_dir.join(format!(
            "stackbuild-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| {
                                tracing_subscriber::EnvFilter::new(
                                    "info,stackbuild=debug,stackbuild_builder=debug",
                                )
                            },
                        ),
                    )
                    .init();
                if !json_mode {
                    eprintln!("Debug logging enabled: {}", log_file.display());
                }
                return;
            }
            Err(e) => {
                if !json_mode {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    // Terminal output comes from the event handler
    tracing_subscriber::fmt()
        .with_writer(std::io::sink)
        .with_env_filter("off")
        .init();
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
}
