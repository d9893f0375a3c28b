//! Streaming downloads to disk

use crate::client::{convert_error, NetClient};
use futures::StreamExt;
use stackbuild_errors::{Error, NetworkError};
use stackbuild_events::{AppEvent, DownloadEvent, EventEmitter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Result of a completed download
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size: u64,
    pub elapsed: Duration,
}

/// Validate URL and check for supported protocols
///
/// # Errors
///
/// Returns an error if the URL is malformed or not http(s).
pub fn validate_url(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NetworkError::InvalidUrl(format!(
            "unsupported scheme `{scheme}` in {url}"
        ))
        .into()),
    }
}

/// File name a URL would be saved under: its last non-empty path segment
#[must_use]
pub fn url_filename(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(ToString::to_string)
}

/// Download `url` to `dest`
///
/// The body is streamed into `<dest>.part` and renamed into place once
/// complete, so an interrupted download never leaves a file at `dest`.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the request fails, or the file
/// cannot be written.
pub async fn download_file(
    client: &NetClient,
    url: &str,
    dest: &Path,
    stage: &str,
    tx: &impl EventEmitter,
) -> Result<DownloadResult, Error> {
    validate_url(url)?;
    let start = Instant::now();

    let result = stream_to_disk(client, url, dest, stage, tx).await;
    match result {
        Ok(size) => {
            let elapsed = start.elapsed();
            tx.emit(AppEvent::Download(DownloadEvent::Completed {
                url: url.to_string(),
                stage: stage.to_string(),
                path: dest.to_path_buf(),
                final_size: size,
                total_time: elapsed,
            }));
            Ok(DownloadResult {
                path: dest.to_path_buf(),
                size,
                elapsed,
            })
        }
        Err(e) => {
            tx.emit(AppEvent::Download(DownloadEvent::Failed {
                url: url.to_string(),
                stage: stage.to_string(),
                error: e.to_string(),
            }));
            Err(e)
        }
    }
}

async fn stream_to_disk(
    client: &NetClient,
    url: &str,
    dest: &Path,
    stage: &str,
    tx: &impl EventEmitter,
) -> Result<u64, Error> {
    let response = client.get(url).await?;

    tx.emit(AppEvent::Download(DownloadEvent::Started {
        url: url.to_string(),
        stage: stage.to_string(),
        total_size: response.content_length(),
    }));

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let partial = partial_path(dest);
    let mut file = fs::File::create(&partial)
        .await
        .map_err(|e| Error::io_with_path(&e, &partial))?;

    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(convert_error(url, &e));
            }
        };
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io_with_path(&e, &partial))?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await?;
    drop(file);

    fs::rename(&partial, dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    Ok(downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/zlib-1.3.tar.gz").is_ok());
        assert!(validate_url("ftp://example.com/zlib.tar.gz").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_url_filename() {
        let url = Url::parse("https://example.com/releases/v1.2/hdf5-1.14.3.tar.gz").unwrap();
        assert_eq!(url_filename(&url).as_deref(), Some("hdf5-1.14.3.tar.gz"));

        let url = Url::parse("https://example.com/archive/").unwrap();
        assert_eq!(url_filename(&url).as_deref(), Some("archive"));

        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(url_filename(&url), None);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/dl/src.tar.gz")),
            PathBuf::from("/dl/src.tar.gz.part")
        );
    }
}
