//! Declarative source patches
//!
//! A patch record replaces `before` with `after` in one file. Re-applying is
//! a no-op: when `after` is already present the record counts as applied.

use crate::environment::BuildEnvironment;
use crate::stage::ResolvedPatch;
use semver::{Version, VersionReq};
use stackbuild_config::PatchCondition;
use stackbuild_errors::{BuildError, Error};

/// What happened to one patch record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
    /// The record's condition did not hold
    NotApplicable { reason: String },
}

/// Parse a version the way toolchains report them
///
/// Accepts a leading `v`, missing minor/patch components (`10` is
/// `10.0.0`) and trailing vendor text after the numeric part.
#[must_use]
pub fn parse_lenient_version(text: &str) -> Option<Version> {
    let text = text.trim();
    let text = text.strip_prefix('v').unwrap_or(text);
    let numeric: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric
        .split('.')
        .filter(|p| !p.is_empty())
        .map(str::parse::<u64>);
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Check a record's condition against the environment
///
/// Returns `None` when the patch should be applied, otherwise the reason it
/// is skipped.
///
/// # Errors
///
/// Returns an error if the requirement itself does not parse.
pub fn evaluate_condition(
    condition: &PatchCondition,
    env: &BuildEnvironment,
) -> Result<Option<String>, Error> {
    let req = VersionReq::parse(&condition.req)?;
    let Some(value) = env.get(&condition.var) else {
        return Ok(Some(format!("{} is not set", condition.var)));
    };
    let Some(version) = parse_lenient_version(value) else {
        return Ok(Some(format!(
            "{}={value} is not a version",
            condition.var
        )));
    };
    if req.matches(&version) {
        Ok(None)
    } else {
        Ok(Some(format!(
            "{}={version} does not satisfy {req}",
            condition.var
        )))
    }
}

/// Apply one patch record
///
/// # Errors
///
/// Returns `PatchFailed` when the file cannot be read or written, or when
/// neither `before` nor `after` appears in it.
pub async fn apply_patch(
    stage: &str,
    patch: &ResolvedPatch,
    env: &BuildEnvironment,
) -> Result<PatchOutcome, Error> {
    let failed = |message: String| -> Error {
        BuildError::PatchFailed {
            stage: stage.to_string(),
            file: patch.file.display().to_string(),
            message,
        }
        .into()
    };

    if let Some(condition) = &patch.record.when {
        if let Some(reason) = evaluate_condition(condition, env)? {
            return Ok(PatchOutcome::NotApplicable { reason });
        }
    }

    let contents = tokio::fs::read_to_string(&patch.file)
        .await
        .map_err(|e| failed(format!("cannot read: {e}")))?;

    if contents.contains(&patch.record.after) {
        return Ok(PatchOutcome::AlreadyApplied);
    }

    if !contents.contains(&patch.record.before) {
        return Err(failed(
            "neither the original nor the patched text is present".to_string(),
        ));
    }

    let patched = contents.replace(&patch.record.before, &patch.record.after);
    if !patched.contains(&patch.record.after) {
        return Err(failed("replacement did not produce the patched text".to_string()));
    }

    tokio::fs::write(&patch.file, patched)
        .await
        .map_err(|e| failed(format!("cannot write: {e}")))?;

    Ok(PatchOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackbuild_config::PatchConfig;
    use std::path::Path;
    use tempfile::tempdir;

    fn record(file: &Path, when: Option<PatchCondition>) -> ResolvedPatch {
        ResolvedPatch {
            file: file.to_path_buf(),
            record: PatchConfig {
                file: file.display().to_string(),
                before: "-fallow-argument-mismatch".to_string(),
                after: "-fallow-argument-mismatch -fno-lto".to_string(),
                description: None,
                when,
            },
        }
    }

    #[test]
    fn test_parse_lenient_version() {
        assert_eq!(parse_lenient_version("10"), Some(Version::new(10, 0, 0)));
        assert_eq!(parse_lenient_version("v2.3"), Some(Version::new(2, 3, 0)));
        assert_eq!(parse_lenient_version("13.2.1-ubuntu"), Some(Version::new(13, 2, 1)));
        assert_eq!(parse_lenient_version("gfortran"), None);
    }

    #[tokio::test]
    async fn test_apply_then_reapply() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("Makefile.in");
        std::fs::write(&file, "FFLAGS = -O2 -fallow-argument-mismatch\n").unwrap();
        let patch = record(&file, None);
        let env = BuildEnvironment::new();

        assert_eq!(
            apply_patch("netcdf-fortran", &patch, &env).await.unwrap(),
            PatchOutcome::Applied
        );
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "FFLAGS = -O2 -fallow-argument-mismatch -fno-lto\n"
        );
        assert_eq!(
            apply_patch("netcdf-fortran", &patch, &env).await.unwrap(),
            PatchOutcome::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn test_missing_text_fails() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("Makefile.in");
        std::fs::write(&file, "FFLAGS = -O2\n").unwrap();

        let err = apply_patch("nf", &record(&file, None), &BuildEnvironment::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::PatchFailed { .. })));
    }

    #[tokio::test]
    async fn test_condition_gates_patch() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("Makefile.in");
        std::fs::write(&file, "FFLAGS = -fallow-argument-mismatch\n").unwrap();
        let condition = PatchCondition {
            var: "GCC_VERSION".to_string(),
            req: ">=10".to_string(),
        };
        let patch = record(&file, Some(condition));

        let old = BuildEnvironment::new().with_var("GCC_VERSION", "9.4.0");
        assert!(matches!(
            apply_patch("nf", &patch, &old).await.unwrap(),
            PatchOutcome::NotApplicable { .. }
        ));
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "FFLAGS = -fallow-argument-mismatch\n"
        );

        let new = BuildEnvironment::new().with_var("GCC_VERSION", "10");
        assert_eq!(
            apply_patch("nf", &patch, &new).await.unwrap(),
            PatchOutcome::Applied
        );

        let unset = BuildEnvironment::new();
        assert!(matches!(
            evaluate_condition(patch.record.when.as_ref().unwrap(), &unset).unwrap(),
            Some(reason) if reason.contains("not set")
        ));
    }
}
