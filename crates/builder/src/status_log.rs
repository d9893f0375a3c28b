//! Append-only JSON-lines status log

use stackbuild_errors::Error;
use stackbuild_types::StatusRecord;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Handle on `<log_dir>/build-status.jsonl`
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory or file cannot be written.
    pub async fn append(&self, record: &StatusRecord) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        file.flush().await?;
        Ok(())
    }

    /// Read every well-formed record in file order
    ///
    /// A missing log reads as empty. Lines that do not parse (a record cut
    /// short by a killed run, for instance) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<StatusRecord>, Error> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(&e, &self.path)),
        };

        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Latest record for each stage, ordered by first appearance
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn latest_per_stage(&self) -> Result<Vec<StatusRecord>, Error> {
        Ok(latest_per_stage(self.read_all().await?))
    }
}

/// Collapse records to the last one seen per stage
#[must_use]
pub fn latest_per_stage(records: Vec<StatusRecord>) -> Vec<StatusRecord> {
    let mut latest: Vec<StatusRecord> = Vec::new();
    for record in records {
        match latest.iter_mut().find(|r| r.stage == record.stage) {
            Some(slot) => *slot = record,
            None => latest.push(record),
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackbuild_types::{StageOutcome, Uuid};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_and_read() {
        let temp = tempdir().unwrap();
        let log = StatusLog::new(temp.path().join("logs/build-status.jsonl"));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        log.append(&StatusRecord::new(first, "zlib", &StageOutcome::Succeeded))
            .await
            .unwrap();
        log.append(&StatusRecord::new(
            first,
            "curl",
            &StageOutcome::Failed {
                reason: "make exited 2".to_string(),
            },
        ))
        .await
        .unwrap();
        log.append(&StatusRecord::new(second, "zlib", &StageOutcome::Skipped))
            .await
            .unwrap();
        log.append(&StatusRecord::new(second, "curl", &StageOutcome::Succeeded))
            .await
            .unwrap();

        let all = log.read_all().await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[1].detail.as_deref(), Some("make exited 2"));

        let latest = log.latest_per_stage().await.unwrap();
        let summary: Vec<_> = latest
            .iter()
            .map(|r| (r.stage.as_str(), r.outcome.as_str(), r.run_id))
            .collect();
        assert_eq!(
            summary,
            [("zlib", "skipped", second), ("curl", "succeeded", second)]
        );
    }

    #[tokio::test]
    async fn test_missing_and_truncated_log() {
        let temp = tempdir().unwrap();
        let log = StatusLog::new(temp.path().join("build-status.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());

        log.append(&StatusRecord::new(Uuid::new_v4(), "zlib", &StageOutcome::Succeeded))
            .await
            .unwrap();
        let mut contents = std::fs::read_to_string(log.path()).unwrap();
        contents.push_str("{\"run_id\":\"trunc");
        std::fs::write(log.path(), contents).unwrap();

        assert_eq!(log.read_all().await.unwrap().len(), 1);
    }
}
