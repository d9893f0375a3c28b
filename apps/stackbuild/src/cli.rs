//! Command line interface definition

use clap::{Parser, Subcommand};
use stackbuild_types::ColorChoice;
use std::path::PathBuf;

/// stackbuild - Idempotent dependency build orchestrator
#[derive(Parser)]
#[command(name = "stackbuild")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Idempotent dependency build orchestrator")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write structured debug logs to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Pipeline file (defaults to ./stackbuild.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline, skipping stages whose output already exists
    Run {
        /// Allow clearing existing build directories marked `clean`
        #[arg(short, long)]
        force: bool,
    },

    /// Show what a run would do without touching anything
    Plan,

    /// Show the latest recorded outcome of each stage
    Status,

    /// Print the environment script for the downstream job
    Env {
        /// Write the script to the configured handoff path instead
        #[arg(short, long)]
        write: bool,
    },
}

impl Commands {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Plan => "plan",
            Self::Status => "status",
            Self::Env { .. } => "env",
        }
    }
}
