//! Source acquisition: download, copy or clone

use crate::stage::ResolvedSource;
use sha2::{Digest, Sha256};
use stackbuild_errors::{BuildError, Error};
use stackbuild_events::{AppEvent, EventEmitter, StageEvent};
use stackbuild_net::{download_file, url_filename, validate_url, NetClient};
use stackbuild_platform::{fs, PlatformCommand, ProcessOperations};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where a fetch left the sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// An archive that still needs extracting
    Archive(PathBuf),
    /// A checkout placed directly at the artifact path
    Checkout(PathBuf),
}

/// Checksum algorithms accepted on URL sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    Sha256,
    Blake3,
}

impl Checksum {
    /// Hex digest of a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn hash_file(self, path: &Path) -> Result<String, Error> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<String, Error> {
            let mut file =
                std::fs::File::open(&path).map_err(|e| Error::io_with_path(&e, &path))?;
            let mut buffer = vec![0u8; 64 * 1024];
            match self {
                Self::Sha256 => {
                    let mut hasher = Sha256::new();
                    loop {
                        let n = file.read(&mut buffer)?;
                        if n == 0 {
                            break;
                        }
                        hasher.update(&buffer[..n]);
                    }
                    Ok(format!("{:x}", hasher.finalize()))
                }
                Self::Blake3 => {
                    let mut hasher = blake3::Hasher::new();
                    loop {
                        let n = file.read(&mut buffer)?;
                        if n == 0 {
                            break;
                        }
                        hasher.update(&buffer[..n]);
                    }
                    Ok(hasher.finalize().to_hex().to_string())
                }
            }
        })
        .await
        .map_err(|e| Error::internal(format!("hash task failed: {e}")))?
    }
}

/// Verify a file against its expected digest; a mismatching file is removed
///
/// # Errors
///
/// Returns `HashMismatch` when the digest differs.
pub async fn verify_checksum(
    stage: &str,
    path: &Path,
    algorithm: Checksum,
    expected: &str,
) -> Result<(), Error> {
    let actual = algorithm.hash_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        return Ok(());
    }
    fs::remove_file(path).await?;
    Err(BuildError::HashMismatch {
        stage: stage.to_string(),
        file: path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
        expected: expected.to_string(),
        actual,
    }
    .into())
}

/// Fetches stage sources into the download directory
pub struct Fetcher<'a, E: EventEmitter> {
    pub client: &'a NetClient,
    pub process: &'a dyn ProcessOperations,
    pub download_dir: &'a Path,
    pub events: &'a E,
}

impl<E: EventEmitter> Fetcher<'_, E> {
    /// Fetch `source` for `stage`
    ///
    /// Archives already present in the download directory are reused after
    /// checksum verification. Git sources are cloned to `artifact`.
    /// External commands are added to `commands_run` as they are issued.
    ///
    /// # Errors
    ///
    /// Returns `FetchFailed` for network, copy or clone failures and
    /// `HashMismatch` for checksum failures.
    pub async fn fetch(
        &self,
        stage: &str,
        source: &ResolvedSource,
        artifact: &Path,
        log_path: &Path,
        commands_run: &mut usize,
    ) -> Result<Fetched, Error> {
        let fetch_failed = |message: String| -> Error {
            BuildError::FetchFailed {
                stage: stage.to_string(),
                source_ref: source.reference(),
                message,
            }
            .into()
        };

        match source {
            ResolvedSource::Url {
                url,
                filename,
                sha256,
                blake3,
            } => {
                let parsed = validate_url(url).map_err(|e| fetch_failed(e.to_string()))?;
                let name = filename
                    .clone()
                    .or_else(|| url_filename(&parsed))
                    .ok_or_else(|| fetch_failed("cannot derive a file name from the URL".to_string()))?;
                let dest = self.download_dir.join(name);

                if fs::exists(&dest).await {
                    self.reused(stage, "download", &dest);
                } else {
                    download_file(self.client, url, &dest, stage, self.events)
                        .await
                        .map_err(|e| match e {
                            Error::Network(net) => fetch_failed(net.to_string()),
                            other => other,
                        })?;
                }

                if let Some(expected) = sha256 {
                    verify_checksum(stage, &dest, Checksum::Sha256, expected).await?;
                }
                if let Some(expected) = blake3 {
                    verify_checksum(stage, &dest, Checksum::Blake3, expected).await?;
                }

                Ok(Fetched::Archive(dest))
            }

            ResolvedSource::Path { path } => {
                let name = path
                    .file_name()
                    .ok_or_else(|| fetch_failed("path has no file name".to_string()))?;
                let dest = self.download_dir.join(name);
                if fs::exists(&dest).await {
                    self.reused(stage, "copy", &dest);
                } else {
                    let mut partial = dest.clone().into_os_string();
                    partial.push(".part");
                    let partial = PathBuf::from(partial);
                    if let Err(e) = fs::copy_file(path, &partial).await {
                        fs::remove_file(&partial).await?;
                        return Err(fetch_failed(e.to_string()));
                    }
                    fs::rename(&partial, &dest).await?;
                }
                Ok(Fetched::Archive(dest))
            }

            ResolvedSource::Git { url, reference } => {
                if let Some(parent) = artifact.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let mut cmd = PlatformCommand::new("git");
                cmd.args(["clone", "--depth", "1"]);
                if let Some(reference) = reference {
                    cmd.arg("--branch").arg(reference);
                }
                cmd.arg(url)
                    .arg(artifact.display().to_string())
                    .log_to(log_path);

                *commands_run += 1;
                let output = self.process.execute_command(cmd).await?;
                if !output.success() {
                    // Do not leave a half-cloned tree that would look fetched
                    fs::remove_dir_all(artifact).await?;
                    return Err(fetch_failed(format!(
                        "git clone exited with {} (output: {})",
                        output
                            .code
                            .map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                        log_path.display()
                    )));
                }
                Ok(Fetched::Checkout(artifact.to_path_buf()))
            }
        }
    }

    fn reused(&self, stage: &str, step: &str, path: &Path) {
        self.events.emit(AppEvent::Stage(StageEvent::StepReused {
            stage: stage.to_string(),
            step: step.to_string(),
            path: path.to_path_buf(),
        }));
    }
}
