//! Handoff to the downstream batch job

use crate::environment::BuildEnvironment;
use stackbuild_config::HandoffConfig;
use stackbuild_errors::{BuildError, Error};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Scope name used in handoff errors
const HANDOFF_SCOPE: &str = "handoff";

/// Variable carrying the artifact path in the export script
pub const ARTIFACT_VAR: &str = "STACKBUILD_ARTIFACT";

/// Artifact path and variables the batch job consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub artifact: PathBuf,
    pub vars: BTreeMap<String, String>,
    /// Configured destination for the export script
    pub script: Option<PathBuf>,
}

impl Handoff {
    /// Bind the handoff description against the final environment
    ///
    /// # Errors
    ///
    /// Returns `UndefinedVariable` if the artifact or script template or a
    /// listed variable is not set.
    pub fn resolve(config: &HandoffConfig, env: &BuildEnvironment) -> Result<Self, Error> {
        let artifact = PathBuf::from(env.substitute(HANDOFF_SCOPE, &config.artifact)?);
        let mut vars = BTreeMap::new();
        for name in &config.vars {
            let value = env.get(name).ok_or_else(|| BuildError::UndefinedVariable {
                stage: HANDOFF_SCOPE.to_string(),
                name: name.clone(),
                template: format!("[handoff] vars = [\"{name}\"]"),
            })?;
            vars.insert(name.clone(), value.to_string());
        }
        let script = config
            .script
            .as_deref()
            .map(|s| env.substitute(HANDOFF_SCOPE, s).map(PathBuf::from))
            .transpose()?;
        Ok(Self {
            artifact,
            vars,
            script,
        })
    }

    /// Check the installed artifact exists
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` when it does not.
    pub fn verify(&self) -> Result<(), Error> {
        if self.artifact.exists() {
            Ok(())
        } else {
            Err(BuildError::PreconditionFailed {
                stage: HANDOFF_SCOPE.to_string(),
                message: format!("artifact {} does not exist", self.artifact.display()),
            }
            .into())
        }
    }

    /// POSIX shell script exporting the variables and the artifact path
    #[must_use]
    pub fn render_script(&self) -> String {
        let mut script = String::from("# Generated by stackbuild; source before submitting the job\n");
        for (name, value) in &self.vars {
            let _ = writeln!(script, "export {name}={}", shell_quote(value));
        }
        let _ = writeln!(
            script,
            "export {ARTIFACT_VAR}={}",
            shell_quote(&self.artifact.display().to_string())
        );
        script
    }

    /// Write the export script to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_script(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        tokio::fs::write(path, self.render_script())
            .await
            .map_err(|e| Error::io_with_path(&e, path))
    }
}

/// Double-quote a value for a POSIX shell
fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
