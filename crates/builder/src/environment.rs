//! Pipeline environment
//!
//! A [`BuildEnvironment`] is an immutable snapshot of the variables visible
//! to a stage. Stages never mutate it; applying a stage's exports produces
//! the next snapshot.

use regex::{Captures, Regex};
use stackbuild_config::constants::{BUILD_ROOT_VAR, JOBS_VAR, PREFIX_VAR};
use stackbuild_errors::{BuildError, ConfigError, Error};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// `$${...}` is an escaped literal, `${NAME}` a reference
static VARIABLE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Separator for path-list variables
const PATH_LIST_SEPARATOR: char = ':';

fn pattern() -> Result<&'static Regex, Error> {
    VARIABLE_PATTERN
        .as_ref()
        .ok_or_else(|| Error::internal("variable pattern failed to compile"))
}

/// Immutable name -> value snapshot threaded through the stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the environment for a run
    ///
    /// `inherit` names host variables copied from `lookup` (normally
    /// `std::env::var`); missing host variables are left out. The
    /// orchestrator's own variables always win over inherited ones.
    #[must_use]
    pub fn seed<F>(
        prefix: &Path,
        build_root: &Path,
        jobs: usize,
        inherit: &[String],
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        for name in inherit {
            if let Some(value) = lookup(name) {
                vars.insert(name.clone(), value);
            }
        }
        vars.insert(PREFIX_VAR.to_string(), prefix.display().to_string());
        vars.insert(BUILD_ROOT_VAR.to_string(), build_root.display().to_string());
        vars.insert(JOBS_VAR.to_string(), jobs.to_string());
        Self { vars }
    }

    /// Layer a table of templated values on top of this environment
    ///
    /// Entries may reference each other in any order. Resolution repeats
    /// until every entry resolved; a round without progress means an
    /// undefined name or a reference cycle.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first entry that could
    /// not be resolved.
    pub fn with_table(&self, table: &BTreeMap<String, String>) -> Result<Self, Error> {
        let mut resolved = self.clone();
        let mut pending: Vec<(&String, &String)> = table.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::new();
            for (name, template) in pending {
                match resolved.try_substitute(template)? {
                    Ok(value) => {
                        resolved.vars.insert(name.clone(), value);
                    }
                    Err(_) => still_pending.push((name, template)),
                }
            }
            if still_pending.len() == before {
                let (name, template) = still_pending[0];
                let missing = resolved
                    .try_substitute(template)?
                    .err()
                    .unwrap_or_default();
                return Err(ConfigError::InvalidValue {
                    field: format!("env.{name}"),
                    value: format!("{template} (undefined or cyclic reference to ${{{missing}}})"),
                }
                .into());
            }
            pending = still_pending;
        }

        Ok(resolved)
    }

    /// Look up a variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Whether a variable is set
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterate variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrow the underlying map
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Resolve `${NAME}` references in `template` for `stage`
    ///
    /// # Errors
    ///
    /// Returns `BuildError::UndefinedVariable` for the first name not set
    /// in this environment.
    pub fn substitute(&self, stage: &str, template: &str) -> Result<String, Error> {
        self.try_substitute(template)?.map_err(|name| {
            BuildError::UndefinedVariable {
                stage: stage.to_string(),
                name,
                template: template.to_string(),
            }
            .into()
        })
    }

    /// Inner result is `Err(name)` for the first undefined reference
    fn try_substitute(&self, template: &str) -> Result<Result<String, String>, Error> {
        let re = pattern()?;
        let mut missing = None;
        let out = re.replace_all(template, |caps: &Captures<'_>| match caps.get(1) {
            None => "$".to_string(),
            Some(name) => match self.vars.get(name.as_str()) {
                Some(value) => value.clone(),
                None => {
                    if missing.is_none() {
                        missing = Some(name.as_str().to_string());
                    }
                    String::new()
                }
            },
        });
        Ok(match missing {
            Some(name) => Err(name),
            None => Ok(out.into_owned()),
        })
    }

    /// Snapshot with a stage's exports and path-list prepends applied
    ///
    /// Exports are resolved against this snapshot, then prepends against
    /// the result. A prepend onto an unset or empty variable sets it.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::UndefinedVariable` if a value references an
    /// unset name.
    pub fn with_stage_output(
        &self,
        stage: &str,
        exports: &BTreeMap<String, String>,
        prepend: &BTreeMap<String, String>,
    ) -> Result<Self, Error> {
        let mut next = self.clone();
        for (name, template) in exports {
            let value = self.substitute(stage, template)?;
            next.vars.insert(name.clone(), value);
        }

        let exported = next.clone();
        for (name, template) in prepend {
            let value = exported.substitute(stage, template)?;
            let joined = match exported.get(name) {
                Some(existing) if !existing.is_empty() => {
                    format!("{value}{PATH_LIST_SEPARATOR}{existing}")
                }
                _ => value,
            };
            next.vars.insert(name.clone(), joined);
        }

        Ok(next)
    }

    /// Snapshot with a single variable set
    #[must_use]
    pub fn with_var(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.vars.insert(name.into(), value.into());
        next
    }
}

impl FromIterator<(String, String)> for BuildEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
