//! Attachment ingestor: download, validate, and normalize uploaded files.
//!
//! Files land in a scoped temporary directory that is removed on every
//! exit path (the `TempDir` guard). The size check runs after download,
//! before any extraction attempt. Dispatch is by file extension for
//! documents; platform photos carry no filename and are read as image
//! bytes directly.

use std::path::Path;

use tracing::{debug, warn};

use parley_types::error::AttachmentError;
use parley_types::model::ImageData;

use crate::transport::Transport;

/// Extensions loaded as image bytes.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Extensions routed to a text-extraction handler.
const TEXT_EXTENSIONS: &[&str] = &["txt", "doc", "docx", "pdf"];

/// What kind of upload the platform delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// A platform photo: no filename, always image content.
    Photo,
    /// A document: dispatch by filename extension.
    Document,
}

/// Reference to an uploaded file plus the text that came with it.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_name: Option<String>,
    /// Caption text accompanying the upload, if any.
    pub caption: Option<String>,
    pub kind: AttachmentKind,
}

/// The model-ready payload produced from an upload.
#[derive(Debug, Clone, Default)]
pub struct NormalizedContent {
    /// Caption text plus any extracted document text.
    pub text: Option<String>,
    pub image: Option<ImageData>,
}

/// Per-type text extraction, implemented in parley-infra.
pub trait TextExtractor: Send + Sync {
    /// Extract text from the file at `path`, dispatched on `extension`
    /// (already lowercased, one of [`TEXT_EXTENSIONS`]).
    fn extract(
        &self,
        path: &Path,
        extension: &str,
    ) -> impl std::future::Future<Output = Result<String, AttachmentError>> + Send;
}

/// Downloads, validates, and normalizes uploads for the orchestrator.
pub struct AttachmentIngestor<T: Transport, X: TextExtractor> {
    transport: T,
    extractor: X,
    max_file_size_bytes: u64,
    max_file_size_mb: u64,
}

impl<T: Transport, X: TextExtractor> AttachmentIngestor<T, X> {
    pub fn new(transport: T, extractor: X, max_file_size_mb: u64) -> Self {
        Self {
            transport,
            extractor,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            max_file_size_mb,
        }
    }

    /// Download and normalize one upload.
    ///
    /// The temporary file is deleted regardless of outcome; extracted text
    /// is appended to the caption, never replacing it.
    pub async fn ingest(
        &self,
        descriptor: &FileDescriptor,
    ) -> Result<NormalizedContent, AttachmentError> {
        // Dropped on every exit path, taking the downloaded file with it.
        let dir = tempfile::tempdir()
            .map_err(|e| AttachmentError::Unexpected(format!("temp dir: {e}")))?;

        // The platform-supplied name is attacker-chosen; keep only the
        // final component so the download cannot leave the temp dir.
        let file_name = descriptor
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("file_{}", descriptor.file_id));
        let path = dir.path().join(&file_name);

        let size = self
            .transport
            .download_file(&descriptor.file_id, &path)
            .await
            .map_err(|e| AttachmentError::Unexpected(format!("download: {e}")))?;
        debug!(file_id = %descriptor.file_id, size, "attachment downloaded");

        if size > self.max_file_size_bytes {
            warn!(file_id = %descriptor.file_id, size, "attachment over size limit");
            return Err(AttachmentError::FileTooLarge {
                limit_mb: self.max_file_size_mb,
            });
        }

        let mut content = NormalizedContent {
            text: descriptor.caption.clone(),
            image: None,
        };

        match descriptor.kind {
            AttachmentKind::Photo => {
                content.image = Some(read_image(&path).await?);
            }
            AttachmentKind::Document => {
                let extension = file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_lowercase())
                    .ok_or_else(|| {
                        AttachmentError::UnsupportedFileType("(no extension)".to_string())
                    })?;

                if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
                    content.image = Some(read_image(&path).await?);
                } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
                    let extracted = self.extractor.extract(&path, &extension).await?;
                    content.text = Some(match content.text.take() {
                        Some(caption) => format!("{caption}\n{extracted}"),
                        None => extracted,
                    });
                } else {
                    return Err(AttachmentError::UnsupportedFileType(extension));
                }
            }
        }

        Ok(content)
    }
}

async fn read_image(path: &Path) -> Result<ImageData, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AttachmentError::Unexpected(format!("read image: {e}")))?;
    Ok(ImageData { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, StubExtractor};

    fn descriptor(kind: AttachmentKind, name: Option<&str>, caption: Option<&str>) -> FileDescriptor {
        FileDescriptor {
            file_id: "file-1".to_string(),
            file_name: name.map(str::to_string),
            caption: caption.map(str::to_string),
            kind,
        }
    }

    fn ingestor(
        transport: FakeTransport,
    ) -> AttachmentIngestor<FakeTransport, StubExtractor> {
        AttachmentIngestor::new(transport, StubExtractor::ok("extracted text"), 10)
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_before_extraction() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", vec![0u8; 15 * 1024 * 1024]);
        let ingestor = AttachmentIngestor::new(
            transport,
            StubExtractor::panicking(),
            10,
        );

        let err = ingestor
            .ingest(&descriptor(AttachmentKind::Document, Some("big.pdf"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::FileTooLarge { limit_mb: 10 }));
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"whatever".to_vec());

        let err = ingestor(transport)
            .ingest(&descriptor(AttachmentKind::Document, Some("data.xyz"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedFileType(ext) if ext == "xyz"));
    }

    #[tokio::test]
    async fn test_missing_extension_rejected() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"whatever".to_vec());

        let err = ingestor(transport)
            .ingest(&descriptor(AttachmentKind::Document, Some("README"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn test_document_text_appended_to_caption() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"file body".to_vec());

        let content = ingestor(transport)
            .ingest(&descriptor(
                AttachmentKind::Document,
                Some("notes.txt"),
                Some("please summarize"),
            ))
            .await
            .unwrap();
        assert_eq!(content.text.as_deref(), Some("please summarize\nextracted text"));
        assert!(content.image.is_none());
    }

    #[tokio::test]
    async fn test_absolute_file_name_cannot_leave_scoped_dir() {
        let outside = tempfile::tempdir().unwrap();
        let escape = outside.path().join("escape.txt");
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"file body".to_vec());

        let content = ingestor(transport)
            .ingest(&descriptor(
                AttachmentKind::Document,
                Some(escape.to_str().unwrap()),
                None,
            ))
            .await
            .unwrap();
        // Only the final component is kept, so nothing lands outside.
        assert!(!escape.exists());
        assert_eq!(content.text.as_deref(), Some("extracted text"));
    }

    #[tokio::test]
    async fn test_parent_segments_in_file_name_stripped() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"file body".to_vec());

        let content = ingestor(transport)
            .ingest(&descriptor(
                AttachmentKind::Document,
                Some("../../notes.txt"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(content.text.as_deref(), Some("extracted text"));
    }

    #[tokio::test]
    async fn test_photo_read_as_image_bytes() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", vec![0xFF, 0xD8, 0xFF]);

        let content = ingestor(transport)
            .ingest(&descriptor(AttachmentKind::Photo, None, Some("what is this?")))
            .await
            .unwrap();
        assert_eq!(content.text.as_deref(), Some("what is this?"));
        assert_eq!(content.image.unwrap().bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_image_document_loaded_by_extension() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", vec![1, 2, 3]);

        let content = ingestor(transport)
            .ingest(&descriptor(AttachmentKind::Document, Some("pic.PNG"), None))
            .await
            .unwrap();
        assert!(content.image.is_some());
        assert!(content.text.is_none());
    }

    #[tokio::test]
    async fn test_extractor_error_propagates_with_cause() {
        let transport = FakeTransport::new();
        transport.stage_file("file-1", b"%PDF-broken".to_vec());
        let ingestor = AttachmentIngestor::new(
            transport,
            StubExtractor::failing(AttachmentError::PdfRead),
            10,
        );

        let err = ingestor
            .ingest(&descriptor(AttachmentKind::Document, Some("doc.pdf"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::PdfRead));
    }
}
