//! Data types served by the corpus routes.
//!
//! Nothing here is persisted: a [`CorpusFile`] is recomputed from the
//! filesystem on every listing request.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Route prefix under which corpus files are downloadable.
pub const DOWNLOAD_PREFIX: &str = "/sources/";

/// A visible corpus document as returned by `GET /sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusFile {
    pub filename: String,
    pub size: u64,
    #[serde(serialize_with = "serialize_iso_millis")]
    pub last_modified: DateTime<Utc>,
    pub download_url: String,
}

impl CorpusFile {
    pub fn new(filename: String, size: u64, last_modified: DateTime<Utc>) -> Self {
        let download_url = format!("{}{}", DOWNLOAD_PREFIX, filename);
        Self {
            filename,
            size,
            last_modified,
            download_url,
        }
    }
}

/// Response body for `GET /sources`.
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<CorpusFile>,
}

/// Response body for a successful `POST /sources`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
}

/// A file's bytes, ready to be sent as a download.
#[derive(Debug)]
pub struct FileDownload {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Formats a timestamp as `2023-01-01T00:00:00.000Z`.
pub fn format_iso_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_iso_millis<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_iso_millis(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn corpus_file_serializes_with_camel_case_and_iso_timestamp() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let file = CorpusFile::new("note.md".to_string(), 120, ts);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filename": "note.md",
                "size": 120,
                "lastModified": "2023-01-01T00:00:00.000Z",
                "downloadUrl": "/sources/note.md"
            })
        );
    }
}
