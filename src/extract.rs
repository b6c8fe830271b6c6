//! Zip extraction.
//!
//! The archive is read through its central directory, so entries written by
//! streaming producers (sizes in a trailing data descriptor) extract like any
//! other. Every entry name is confined to the destination with [`confine`];
//! a single unsafe name aborts the extraction.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

use crate::store::{confine, is_reserved_path, PathViolation};

/// Maximum number of entries accepted from one archive.
pub const MAX_ENTRIES: usize = 10_000;
/// Maximum total decompressed bytes written from one archive (zip-bomb protection).
pub const MAX_EXTRACTED_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("unsafe entry name {name:?}: {violation}")]
    UnsafeEntry {
        name: String,
        violation: PathViolation,
    },

    #[error("archive has more than {} entries", MAX_ENTRIES)]
    TooManyEntries,

    #[error("archive expands to more than {} bytes", MAX_EXTRACTED_BYTES)]
    TooLarge,

    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What an extraction produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn entry_target(dest: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    let unsafe_entry = |violation| ExtractError::UnsafeEntry {
        name: name.to_string(),
        violation,
    };
    if is_reserved_path(name) {
        return Err(unsafe_entry(PathViolation::Reserved));
    }
    confine(dest, name).map_err(unsafe_entry)
}

/// Extracts the zip archive at `archive` into `dest`. Blocking.
pub fn extract_zip_file(archive: &Path, dest: &Path) -> Result<ExtractionSummary, ExtractError> {
    let file = File::open(archive).map_err(io_error(archive))?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    if zip.len() > MAX_ENTRIES {
        return Err(ExtractError::TooManyEntries);
    }

    let mut summary = ExtractionSummary::default();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let target = entry_target(dest, &name)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(io_error(&target))?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut out = File::create(&target).map_err(io_error(&target))?;

        let remaining = MAX_EXTRACTED_BYTES - summary.bytes;
        let written = std::io::copy(&mut (&mut entry).take(remaining + 1), &mut out)
            .map_err(io_error(&target))?;
        if written > remaining {
            return Err(ExtractError::TooLarge);
        }

        debug!(entry = %name, bytes = written, "extracted");
        summary.files += 1;
        summary.bytes += written;
    }

    Ok(summary)
}
