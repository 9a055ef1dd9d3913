//! Upload validation and text extraction.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::debug;

/// Extracted text shorter than this (after trimming) is treated as unreadable.
pub const MIN_MEANINGFUL_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    #[error("No meaningful text extracted from the PDF. It may be scanned with poor quality or empty.")]
    NoMeaningfulText,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reduces a client supplied filename to a safe single path component.
///
/// Returns `None` when nothing usable is left.
pub fn secure_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Name of the document without its extension.
pub fn document_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
}

/// Removes every previously stored document from `upload_dir`.
pub async fn clear_upload_dir(upload_dir: &Path) -> anyhow::Result<usize> {
    debug!(dir = %upload_dir.display(), "clearing stored documents");
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(upload_dir)
        .await
        .with_context(|| format!("failed to read upload dir '{}'", upload_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_document = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(DocumentKind::from_filename)
            .is_some();
        if is_document && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete '{}'", path.display()))?;
            debug!(path = %path.display(), "deleted stored document");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Replaces whatever is in `upload_dir` with `bytes` stored under `filename`.
pub async fn store_upload(upload_dir: &Path, filename: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(upload_dir).await?;
    clear_upload_dir(upload_dir).await?;
    let path = upload_dir.join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    debug!(path = %path.display(), size_bytes = bytes.len(), "document saved");
    Ok(path)
}

/// Pulls the text out of a stored document.
///
/// An empty result means the document carried no text layer at all; short
/// but non-empty text is rejected as [`IngestError::NoMeaningfulText`].
pub async fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, IngestError> {
    debug!(path = %path.display(), ?kind, "extracting text");
    let text = match kind {
        DocumentKind::Text => {
            let bytes = tokio::fs::read(path).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        DocumentKind::Pdf => {
            let bytes = tokio::fs::read(path).await?;
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .context("pdf extraction task failed")?
                .map_err(|e| IngestError::Pdf(e.to_string()))?
        }
    };
    debug!(chars = text.len(), "text extracted");

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.chars().count() < MIN_MEANINGFUL_TEXT_CHARS {
        return Err(IngestError::NoMeaningfulText);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_extensions_case_insensitively() {
        assert_eq!(DocumentKind::from_filename("Report.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_filename("notes.txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_filename("image.png"), None);
        assert_eq!(DocumentKind::from_filename("pdf"), None);
    }

    #[test]
    fn secure_filename_strips_paths_and_odd_characters() {
        assert_eq!(
            secure_filename("../../etc/My Report (v2).pdf").as_deref(),
            Some("My_Report__v2_.pdf")
        );
        assert_eq!(secure_filename("C:\\docs\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(secure_filename("../"), None);
    }

    #[test]
    fn stem_drops_only_last_extension() {
        assert_eq!(document_stem("annual.report.pdf"), "annual.report");
        assert_eq!(document_stem("README"), "README");
    }

    #[tokio::test]
    async fn store_upload_replaces_previous_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("old.pdf"), b"old").expect("seed");
        std::fs::write(dir.path().join("keep.log"), b"log").expect("seed");

        let path = store_upload(dir.path(), "new.txt", b"fresh")
            .await
            .expect("store");

        assert_eq!(path, dir.path().join("new.txt"));
        assert!(!dir.path().join("old.pdf").exists());
        assert!(dir.path().join("keep.log").exists());
    }

    #[tokio::test]
    async fn short_text_is_rejected_and_blank_text_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let short = dir.path().join("short.txt");
        std::fs::write(&short, "too short").expect("write");
        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "   \n ").expect("write");

        assert!(matches!(
            extract_text(&short, DocumentKind::Text).await,
            Err(IngestError::NoMeaningfulText)
        ));
        assert_eq!(
            extract_text(&blank, DocumentKind::Text).await.expect("blank"),
            ""
        );
    }
}
