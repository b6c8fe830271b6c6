//! Single-file retrieval.
//!
//! Used by `GET /sources/{filename}` and the `docshelf get` command. Any
//! file under the corpus root can be fetched by name, listed or not, as long
//! as the name resolves inside the root.

use anyhow::{Context, Result};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tokio::fs;

use crate::error::AppError;
use crate::models::FileDownload;
use crate::store::{CorpusStore, PathViolation};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Content type by filename suffix.
pub fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".pdf") {
        MIME_PDF
    } else if filename.ends_with(".md") {
        MIME_MARKDOWN
    } else {
        MIME_OCTET_STREAM
    }
}

/// `Content-Disposition` value forcing a download under the file's own name.
pub fn attachment_disposition(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .replace('"', "'");
    format!("attachment; filename=\"{}\"", name)
}

fn invalid_filename(_: PathViolation) -> AppError {
    AppError::bad_request("Invalid filename")
}

/// Reads one file from the current corpus generation.
pub async fn retrieve(store: &CorpusStore, filename: &str) -> Result<FileDownload, AppError> {
    let reader = store
        .reader()
        .await
        .map_err(|e| AppError::internal("Failed to download file", e))?;
    let path = reader.resolve(filename).map_err(invalid_filename)?;

    let metadata = match fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            return Err(AppError::not_found("File not found"));
        }
        Err(e) => return Err(AppError::internal("Failed to download file", e)),
    };
    if !metadata.is_file() {
        return Err(AppError::not_found("File not found"));
    }

    let contained = reader
        .contains(&path)
        .await
        .map_err(|e| AppError::internal("Failed to download file", e))?;
    if !contained {
        return Err(invalid_filename(PathViolation::Escapes));
    }

    let bytes = fs::read(&path)
        .await
        .map_err(|e| AppError::internal("Failed to download file", e))?;

    Ok(FileDownload {
        filename: filename.to_string(),
        content_type: content_type_for(filename),
        bytes,
    })
}

/// CLI entry point: writes the file to `output`, or stdout when absent.
pub async fn run_get(store: &CorpusStore, filename: &str, output: Option<&Path>) -> Result<()> {
    let download = retrieve(store, filename).await?;

    match output {
        Some(path) => {
            fs::write(path, &download.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} ({}, {} bytes) -> {}",
                download.filename,
                download.content_type,
                download.bytes.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&download.bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
