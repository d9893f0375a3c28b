//! Source archive extraction
//!
//! Archives are unpacked into a staging directory beside the destination
//! and moved into place afterwards, so the destination only appears once
//! extraction has finished. A single top-level directory is stripped.

use stackbuild_errors::{BuildError, Error};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Zip,
}

impl ArchiveFormat {
    /// Detect format from the file name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Detect format from leading bytes
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if header.starts_with(b"BZh") {
            Some(Self::TarBz2)
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::TarXz)
        } else if header.starts_with(b"PK\x03\x04") {
            Some(Self::Zip)
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Detect the format of an archive on disk, by name first and then by
    /// content
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn detect(path: &Path) -> Result<Option<Self>, Error> {
        if let Some(format) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_name)
        {
            return Ok(Some(format));
        }

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        let mut header = Vec::with_capacity(512);
        (&mut file).take(512).read_to_end(&mut header).await?;
        Ok(Self::from_magic(&header))
    }
}

/// Extract `archive` so that its contents end up in `dest`
///
/// # Errors
///
/// Returns `UnsupportedArchiveFormat` for unknown formats and
/// `ExtractionFailed` for corrupt archives or filesystem problems.
pub async fn extract_archive(stage: &str, archive: &Path, dest: &Path) -> Result<(), Error> {
    let failed = |message: String| -> Error {
        BuildError::ExtractionFailed {
            stage: stage.to_string(),
            message,
        }
        .into()
    };

    let format = ArchiveFormat::detect(archive)
        .await?
        .ok_or_else(|| BuildError::UnsupportedArchiveFormat {
            stage: stage.to_string(),
            file: archive.display().to_string(),
        })?;

    let parent = dest
        .parent()
        .ok_or_else(|| failed(format!("{} has no parent directory", dest.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| failed(format!("failed to create {}: {e}", parent.display())))?;

    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(|e| failed(format!("failed to create staging directory: {e}")))?;

    // The tree gets its own directory so it does not inherit the 0700 mode
    // of the staging directory
    let unpacked = staging.path().join("tree");
    match format {
        ArchiveFormat::Zip => unpack_zip(archive, &unpacked).await.map_err(failed)?,
        ArchiveFormat::Tar => unpack_tar(archive, &unpacked).await.map_err(failed)?,
        compressed => {
            let tar_path = staging.path().join(".archive.tar");
            decompress(archive, &tar_path, compressed)
                .await
                .map_err(failed)?;
            unpack_tar(&tar_path, &unpacked).await.map_err(failed)?;
            tokio::fs::remove_file(&tar_path)
                .await
                .map_err(|e| failed(format!("failed to remove temporary tar: {e}")))?;
        }
    }

    promote(&unpacked, dest).await.map_err(failed)
}

/// Move the unpacked tree into place, stripping a single top-level directory
async fn promote(unpacked: &Path, dest: &Path) -> Result<(), String> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(unpacked)
        .await
        .map_err(|e| format!("failed to read extracted tree: {e}"))?;
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| format!("failed to read extracted tree: {e}"))?
    {
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err("archive is empty".to_string());
    }

    let root: PathBuf = if entries.len() == 1
        && entries[0]
            .file_type()
            .await
            .map_err(|e| e.to_string())?
            .is_dir()
    {
        entries[0].path()
    } else {
        // No single top-level directory: the tree itself becomes dest
        unpacked.to_path_buf()
    };

    tokio::fs::rename(&root, dest)
        .await
        .map_err(|e| format!("failed to move extracted tree to {}: {e}", dest.display()))
}

async fn decompress(archive: &Path, output: &Path, format: ArchiveFormat) -> Result<(), String> {
    use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};

    let input = tokio::fs::File::open(archive)
        .await
        .map_err(|e| format!("failed to open archive: {e}"))?;
    let mut out = tokio::fs::File::create(output)
        .await
        .map_err(|e| format!("failed to create temp file: {e}"))?;
    let reader = BufReader::new(input);

    let copied = match format {
        ArchiveFormat::TarGz => {
            let mut decoder = GzipDecoder::new(reader);
            decoder.multiple_members(true);
            tokio::io::copy(&mut decoder, &mut out).await
        }
        ArchiveFormat::TarBz2 => tokio::io::copy(&mut BzDecoder::new(reader), &mut out).await,
        ArchiveFormat::TarXz => tokio::io::copy(&mut XzDecoder::new(reader), &mut out).await,
        ArchiveFormat::Tar | ArchiveFormat::Zip => {
            return Err(format!("{format:?} is not compressed"));
        }
    };
    copied.map_err(|e| format!("failed to decompress {format:?} archive: {e}"))?;

    out.flush()
        .await
        .map_err(|e| format!("failed to flush temp file: {e}"))
}

async fn unpack_tar(tar_path: &Path, dest: &Path) -> Result<(), String> {
    let tar_path = tar_path.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest).map_err(|e| format!("failed to create directory: {e}"))?;
        let file =
            std::fs::File::open(&tar_path).map_err(|e| format!("failed to open tar: {e}"))?;
        let mut archive = tar::Archive::new(file);
        archive.set_preserve_permissions(true);
        archive
            .unpack(&dest)
            .map_err(|e| format!("failed to unpack tar: {e}"))
    })
    .await
    .map_err(|e| format!("task join error: {e}"))?
}

async fn unpack_zip(zip_path: &Path, dest: &Path) -> Result<(), String> {
    let zip_path = zip_path.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest).map_err(|e| format!("failed to create directory: {e}"))?;
        let file =
            std::fs::File::open(&zip_path).map_err(|e| format!("failed to open zip archive: {e}"))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| format!("failed to read zip archive: {e}"))?;
        archive
            .extract(&dest)
            .map_err(|e| format!("failed to extract zip archive: {e}"))
    })
    .await
    .map_err(|e| format!("task join error: {e}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(ArchiveFormat::from_name("hdf5-1.14.3.tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_name("x.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_name("curl.tar.bz2"), Some(ArchiveFormat::TarBz2));
        assert_eq!(ArchiveFormat::from_name("zlib.tar.xz"), Some(ArchiveFormat::TarXz));
        assert_eq!(ArchiveFormat::from_name("src.tar"), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_name("main.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_name("README"), None);
    }

    #[test]
    fn test_format_from_magic() {
        assert_eq!(ArchiveFormat::from_magic(&[0x1f, 0x8b, 8, 0]), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_magic(b"BZh91AY"), Some(ArchiveFormat::TarBz2));
        assert_eq!(ArchiveFormat::from_magic(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_magic(b"plain text"), None);
    }

    #[tokio::test]
    async fn test_extract_strips_single_top_dir() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("zlib-1.3.tar");
        write_tar(
            &archive,
            &[
                ("zlib-1.3/configure", b"#!/bin/sh\n"),
                ("zlib-1.3/src/zlib.h", b"/* header */"),
            ],
        );

        let dest = temp.path().join("build").join("zlib");
        extract_archive("zlib", &archive, &dest).await.unwrap();

        assert!(dest.join("configure").is_file());
        assert!(dest.join("src/zlib.h").is_file());
        // Staging directories are gone
        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("build"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("zlib")]);
    }

    #[tokio::test]
    async fn test_extract_without_top_dir() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("flat.tar");
        write_tar(&archive, &[("a.txt", b"a"), ("b.txt", b"b")]);

        let dest = temp.path().join("flat");
        extract_archive("flat", &archive, &dest).await.unwrap();

        assert!(dest.join("a.txt").is_file());
        assert!(dest.join("b.txt").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let plain = temp.path().join("plain");
            std::fs::create_dir(&plain).unwrap();
            let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode(&dest), mode(&plain));
        }
    }

    #[tokio::test]
    async fn test_extensionless_file_is_sniffed() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("download");
        write_tar(&archive, &[("pkg/file", b"x")]);

        assert_eq!(
            ArchiveFormat::detect(&archive).await.unwrap(),
            Some(ArchiveFormat::Tar)
        );
        let dest = temp.path().join("pkg");
        extract_archive("pkg", &archive, &dest).await.unwrap();
        assert!(dest.join("file").is_file());
    }

    #[tokio::test]
    async fn test_unknown_format() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("notes");
        std::fs::write(&archive, b"just some text").unwrap();

        let err = extract_archive("x", &archive, &temp.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Build(BuildError::UnsupportedArchiveFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_archive() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        std::fs::write(&archive, [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad]).unwrap();

        let dest = temp.path().join("broken");
        let err = extract_archive("broken", &archive, &dest).await.unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::ExtractionFailed { .. })));
        assert!(!dest.exists());
    }
}
