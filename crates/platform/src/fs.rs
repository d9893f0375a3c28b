//! Filesystem convenience helpers returning `stackbuild_errors::Error`

use stackbuild_errors::{Error, PlatformError};
use std::path::Path;
use tokio::fs;

/// Result type for filesystem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Create a directory and all parents
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))
}

/// Remove a directory tree; a missing directory is not an error
///
/// # Errors
///
/// Returns an error if the tree exists but cannot be removed.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PlatformError::FilesystemOperationFailed {
            operation: format!("remove {}", path.display()),
            message: e.to_string(),
        }
        .into()),
    }
}

/// Remove a file; a missing file is not an error
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

/// Check if a path exists
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Rename a file or directory
///
/// # Errors
///
/// Returns an error if the rename fails.
pub async fn rename(src: &Path, dst: &Path) -> Result<()> {
    fs::rename(src, dst)
        .await
        .map_err(|e| Error::io_with_path(&e, dst))
}

/// Copy a single file, creating the destination's parent directory
///
/// # Errors
///
/// Returns an error if the source cannot be read or the copy fails.
pub async fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        create_dir_all(parent).await?;
    }
    fs::copy(src, dst)
        .await
        .map_err(|e| Error::io_with_path(&e, src))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let temp = tempdir().unwrap();
        remove_dir_all(&temp.path().join("absent")).await.unwrap();
        remove_file(&temp.path().join("absent.txt")).await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_file_creates_parent() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("a.tar");
        tokio::fs::write(&src, b"data").await.unwrap();
        let dst = temp.path().join("downloads/a.tar");

        assert_eq!(copy_file(&src, &dst).await.unwrap(), 4);
        assert!(exists(&dst).await);
    }
}
