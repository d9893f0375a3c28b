//! Stage definitions as written in the pipeline file
//!
//! Values are kept as raw templates; `${NAME}` references are resolved by
//! the orchestrator against the environment in effect when the stage runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One `[[stage]]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    /// Directory whose existence marks fetch/extract as done
    #[serde(default)]
    pub artifact: Option<String>,
    /// Path whose existence marks the whole stage as built
    #[serde(default)]
    pub install_marker: Option<String>,
    /// Working directory for commands and patches (defaults to `artifact`)
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    /// Variables set for every later stage
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
    /// Path-list variables extended for every later stage
    #[serde(default)]
    pub prepend: BTreeMap<String, String>,
    #[serde(default, rename = "patch")]
    pub patches: Vec<PatchConfig>,
    /// Directory cleared before rebuilding; needs `--force` when it exists
    #[serde(default)]
    pub clean: Option<String>,
    #[serde(default)]
    pub requires: RequiresConfig,
    #[serde(default)]
    pub vendor_check: Option<VendorCheckConfig>,
}

impl StageConfig {
    /// A stage with only a name; handy for building pipelines in code
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            artifact: None,
            install_marker: None,
            workdir: None,
            commands: Vec::new(),
            exports: BTreeMap::new(),
            prepend: BTreeMap::new(),
            patches: Vec::new(),
            clean: None,
            requires: RequiresConfig::default(),
            vendor_check: None,
        }
    }
}

/// Where a stage's sources come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceConfig {
    Url(UrlSource),
    Git(GitSource),
    Path(PathSource),
}

impl SourceConfig {
    /// Human-readable reference used in diagnostics
    #[must_use]
    pub fn reference(&self) -> &str {
        match self {
            Self::Url(s) => &s.url,
            Self::Git(s) => &s.git,
            Self::Path(s) => &s.path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrlSource {
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub blake3: Option<String>,
    /// Name of the downloaded file; defaults to the last URL segment
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSource {
    pub git: String,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

/// A local archive copied into the download directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathSource {
    pub path: String,
}

/// A build command: a shell line or a program with arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    Shell(String),
    Exec {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        dir: Option<String>,
    },
}

/// Declarative in-place edit of a third-party file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    /// File relative to the stage working directory
    pub file: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub when: Option<PatchCondition>,
}

/// Apply a patch only when `var` satisfies the semver requirement `req`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchCondition {
    pub var: String,
    pub req: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiresConfig {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Non-fatal probe of the toolchain identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VendorCheckConfig {
    pub command: String,
    pub contains: String,
}
