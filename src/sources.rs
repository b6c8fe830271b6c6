//! Corpus listing.
//!
//! Used by `GET /sources` and the `docshelf sources` command. Only regular
//! files with an allow-listed suffix are visible; everything else in the
//! corpus directory (archive leftovers, subdirectories) is skipped.

use anyhow::Result;
use tracing::debug;

use crate::error::AppError;
use crate::models::{format_iso_millis, CorpusFile};
use crate::store::CorpusStore;

/// Suffixes visible through the listing. Matching is case-sensitive.
pub const LISTED_SUFFIXES: &[&str] = &[".md", ".pdf"];

pub fn is_listed(name: &str) -> bool {
    LISTED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Builds the metadata view of the current corpus generation.
///
/// Sorted by filename so CLI output is stable; HTTP clients should not rely
/// on the order.
pub async fn list_corpus(store: &CorpusStore) -> Result<Vec<CorpusFile>, AppError> {
    let reader = store
        .reader()
        .await
        .map_err(|e| AppError::internal("Failed to list source files", e))?;
    let entries = reader
        .list_entries()
        .await
        .map_err(|e| AppError::internal("Failed to list source files", e))?;

    let mut files: Vec<CorpusFile> = entries
        .into_iter()
        .filter(|entry| entry.is_file && is_listed(&entry.name))
        .map(|entry| CorpusFile::new(entry.name, entry.size, entry.modified))
        .collect();
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    debug!(
        generation = reader.generation(),
        count = files.len(),
        "listed corpus"
    );
    Ok(files)
}

/// CLI entry point: prints the listing as a table.
pub async fn run_sources(store: &CorpusStore) -> Result<()> {
    let files = list_corpus(store).await?;

    if files.is_empty() {
        println!("No documents in {}", store.root().display());
        return Ok(());
    }

    println!("{:<40} {:>12}  LAST MODIFIED", "FILENAME", "SIZE");
    for file in &files {
        println!(
            "{:<40} {:>12}  {}",
            file.filename,
            file.size,
            format_iso_millis(&file.last_modified)
        );
    }
    println!("{} document(s)", files.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn names(files: &[CorpusFile]) -> BTreeSet<String> {
        files.iter().map(|f| f.filename.clone()).collect()
    }

    #[test]
    fn suffix_filter() {
        assert!(is_listed("note.md"));
        assert!(is_listed("paper.pdf"));
        assert!(!is_listed("skip.exe"));
        assert!(!is_listed("notes.txt"));
        assert!(!is_listed("README.MD"));
        assert!(!is_listed("md"));
    }

    #[tokio::test]
    async fn empty_corpus_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = CorpusStore::new(tmp.path().join("reading"));
        assert!(list_corpus(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_only_allowed_regular_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("reading");
        std::fs::create_dir_all(root.join("folder.md")).unwrap();
        std::fs::write(root.join("note.md"), vec![b'x'; 120]).unwrap();
        std::fs::write(root.join("paper.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(root.join("skip.exe"), b"MZ").unwrap();
        std::fs::write(root.join("notes.txt"), b"plain").unwrap();

        let store = CorpusStore::new(&root);
        let files = list_corpus(&store).await.unwrap();

        let expected: BTreeSet<String> =
            ["note.md", "paper.pdf"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&files), expected);

        let note = files.iter().find(|f| f.filename == "note.md").unwrap();
        assert_eq!(note.size, 120);
        assert_eq!(note.download_url, "/sources/note.md");
    }

    #[tokio::test]
    async fn unreadable_root_is_internal_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("reading");
        // A regular file where the directory should be.
        std::fs::write(&root, b"not a directory").unwrap();

        let store = CorpusStore::new(&root);
        let err = list_corpus(&store).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_SERVER_ERROR");
        assert_eq!(err.to_string(), "Failed to list source files");
    }
}
