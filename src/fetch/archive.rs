// src/fetch/archive.rs

//! Source archive unpacking
//!
//! The compression layer is detected from magic bytes rather than the file
//! name, since cached archives are stored under their checksum.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compression wrapped around a tarball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Plain tar
    Tar,
    /// Gzip (`.tar.gz`, `.tgz`)
    Gzip,
    /// XZ (`.tar.xz`)
    Xz,
    /// Zstandard (`.tar.zst`)
    Zstd,
}

impl ArchiveFormat {
    /// Detect the compression from the leading bytes of a file
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    ///
    /// Anything else is assumed to be an uncompressed tar.
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::Tar
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn create_decoder<'a, R: Read + 'a>(reader: R, format: ArchiveFormat) -> io::Result<Box<dyn Read + 'a>> {
    Ok(match format {
        ArchiveFormat::Tar => Box::new(reader),
        ArchiveFormat::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
        ArchiveFormat::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
        ArchiveFormat::Zstd => Box::new(zstd::Decoder::new(reader)?),
    })
}

/// Unpack `archive` into `dest` and return the source root
///
/// Source tarballs conventionally wrap everything in one top-level
/// directory (`kdreports-1.6.0/`). When that is the case the directory is
/// returned; otherwise `dest` itself is the source root. Entries that would
/// escape `dest` are skipped by the tar reader.
pub fn unpack(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let mut file = File::open(archive).map_err(|e| {
        Error::IoError(format!("Failed to open archive {}: {}", archive.display(), e))
    })?;

    let mut magic = [0u8; 6];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    let format = ArchiveFormat::from_magic_bytes(&magic[..read]);
    debug!("Unpacking {} ({}) into {}", archive.display(), format, dest.display());

    fs::create_dir_all(dest)?;
    let decoder = create_decoder(file, format).map_err(|e| {
        Error::IoError(format!("Failed to create {} decoder: {}", format, e))
    })?;
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.unpack(dest).map_err(|e| {
        Error::IoError(format!(
            "Failed to extract {} into {}: {}",
            archive.display(),
            dest.display(),
            e
        ))
    })?;

    source_root(dest)
}

fn source_root(dest: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(dest)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1
        && entries[0].file_type()?.is_dir()
        && let Some(entry) = entries.pop()
    {
        return Ok(entry.path());
    }
    Ok(dest.to_path_buf())
}
