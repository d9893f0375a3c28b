#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Host platform access for stackbuild
//!
//! This crate provides the seams the orchestrator uses to touch the host:
//! - Process execution behind the [`ProcessOperations`] trait
//! - Executable lookup on `PATH`
//! - Filesystem helpers returning `stackbuild_errors::Error`

pub mod fs;
pub mod process;

pub use process::{CommandOutput, HostProcess, PlatformCommand, ProcessOperations};
