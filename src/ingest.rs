//! Bulk replacement of the corpus from an uploaded zip archive.
//!
//! Coordinates the full flow: validate the upload name → take the writer
//! lock and a staging workspace → spool the body to disk → extract it on the
//! blocking pool → swap the staged tree into place.
//!
//! The name check runs before anything touches the disk, so a rejected upload
//! leaves the corpus exactly as it was. Any later failure, including the
//! client going away mid-upload, drops the [`Replacement`] and with it the
//! workspace; the live corpus stays on its last complete generation.
//!
//! [`Replacement`]: crate::store::Replacement

use anyhow::{Context, Result};
use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::{AppError, BoxError};
use crate::extract::extract_zip_file;
use crate::store::CorpusStore;

pub const SUCCESS_MESSAGE: &str = "Zip file uploaded and extracted successfully";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub generation: u64,
    pub files: usize,
    pub bytes: u64,
}

/// Checks that an upload is present and named like a zip archive.
pub fn validate_archive_name(filename: Option<&str>) -> Result<&str, AppError> {
    let name = filename.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    if !name.ends_with(".zip") {
        return Err(AppError::bad_request("Only zip files are supported"));
    }
    Ok(name)
}

fn processing_failed(source: impl Into<BoxError>) -> AppError {
    AppError::internal("Failed to process the uploaded file", source)
}

/// Replaces the whole corpus with the contents of the archive in `body`.
///
/// `body` errors are returned as-is (after the workspace is discarded).
/// More than `max_bytes` of upload fails with [`AppError::PayloadTooLarge`].
pub async fn replace_corpus<S>(
    store: &CorpusStore,
    filename: Option<&str>,
    body: S,
    max_bytes: u64,
) -> Result<ReplaceOutcome, AppError>
where
    S: Stream<Item = Result<Bytes, AppError>>,
{
    let filename = validate_archive_name(filename)?;
    let replacement = store.begin_replace().await.map_err(processing_failed)?;

    let uploaded = spool(body, replacement.spool_path(), max_bytes).await?;

    let archive = replacement.spool_path().to_path_buf();
    let staging = replacement.staging_dir().to_path_buf();
    let summary = tokio::task::spawn_blocking(move || extract_zip_file(&archive, &staging))
        .await
        .map_err(processing_failed)?
        .map_err(processing_failed)?;

    let generation = replacement.commit().await.map_err(processing_failed)?;

    info!(
        archive = filename,
        uploaded_bytes = uploaded,
        files = summary.files,
        extracted_bytes = summary.bytes,
        generation,
        "corpus replaced"
    );

    Ok(ReplaceOutcome {
        generation,
        files: summary.files,
        bytes: summary.bytes,
    })
}

/// Writes `body` to `path`, refusing more than `max_bytes`.
async fn spool<S>(body: S, path: &Path, max_bytes: u64) -> Result<u64, AppError>
where
    S: Stream<Item = Result<Bytes, AppError>>,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(processing_failed)?;
    let mut body = std::pin::pin!(body);
    let mut total = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        if total > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload exceeds the {} byte limit",
                max_bytes
            )));
        }
        file.write_all(&chunk).await.map_err(processing_failed)?;
    }

    // tokio's File finishes writes in the background; flush before the blocking reader opens it.
    file.flush().await.map_err(processing_failed)?;
    Ok(total)
}

/// CLI entry point: replaces the corpus from a local archive file.
pub async fn run_ingest(store: &CorpusStore, archive: &Path) -> Result<()> {
    let filename = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    validate_archive_name(filename.as_deref())?;

    let file = tokio::fs::File::open(archive)
        .await
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let body = ReaderStream::new(file)
        .map(|chunk| chunk.map_err(|e| AppError::internal("Failed to read the archive", e)));

    let outcome = replace_corpus(store, filename.as_deref(), body, u64::MAX).await?;

    println!("ingest {}", archive.display());
    println!("  files extracted: {}", outcome.files);
    println!("  bytes written: {}", outcome.bytes);
    println!("  generation: {}", outcome.generation);
    println!("ok");

    Ok(())
}
