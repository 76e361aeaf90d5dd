//! Document text extraction.
//!
//! Implements `parley_core::attachment::TextExtractor` for the supported
//! document types: plain text (strict UTF-8), Word documents via
//! `docx-rs`, and PDFs via `pdf-extract`. Parsing runs on the blocking
//! pool; these are synchronous CPU-bound libraries.

use std::path::{Path, PathBuf};

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use tracing::debug;

use parley_core::attachment::TextExtractor;
use parley_types::error::AttachmentError;

/// Extracts text from txt, doc/docx, and pdf files.
pub struct DocumentTextExtractor;

impl TextExtractor for DocumentTextExtractor {
    async fn extract(&self, path: &Path, extension: &str) -> Result<String, AttachmentError> {
        let text = match extension {
            "txt" => read_text(path).await?,
            "doc" | "docx" => read_word(path.to_path_buf()).await?,
            "pdf" => read_pdf(path.to_path_buf()).await?,
            other => {
                return Err(AttachmentError::Unexpected(format!(
                    "no extractor for '{other}'"
                )));
            }
        };
        debug!(extension, chars = text.len(), "document text extracted");
        Ok(text)
    }
}

/// Strict UTF-8: a text file that does not decode is a user-visible
/// decoding error, not silently lossy output.
async fn read_text(path: &Path) -> Result<String, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AttachmentError::Unexpected(format!("read: {e}")))?;
    String::from_utf8(bytes).map_err(|_| AttachmentError::Decoding)
}

async fn read_word(path: PathBuf) -> Result<String, AttachmentError> {
    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path)
            .map_err(|e| AttachmentError::Unexpected(format!("read: {e}")))?;
        let docx = docx_rs::read_docx(&bytes).map_err(|_| AttachmentError::WordRead)?;

        let mut paragraphs = Vec::new();
        for child in &docx.document.children {
            if let DocumentChild::Paragraph(paragraph) = child {
                let mut line = String::new();
                for pc in &paragraph.children {
                    if let ParagraphChild::Run(run) = pc {
                        for rc in &run.children {
                            if let RunChild::Text(text) = rc {
                                line.push_str(&text.text);
                            }
                        }
                    }
                }
                paragraphs.push(line);
            }
        }
        Ok(paragraphs.join("\n"))
    })
    .await
    .map_err(|e| AttachmentError::Unexpected(format!("join: {e}")))?
}

async fn read_pdf(path: PathBuf) -> Result<String, AttachmentError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|_| AttachmentError::PdfRead)
    })
    .await
    .map_err(|e| AttachmentError::Unexpected(format!("join: {e}")))?
}
