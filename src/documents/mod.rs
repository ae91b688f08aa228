// Document loading
// Resolves a path to its document kind and extracts plain text from it


pub mod encoding;

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::{RagError, Result};

pub use encoding::{Decoding, TextEncoding, decode_text};

/// Supported document kinds, keyed by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

/// Text extracted from a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub text: String,
    pub decoding: Decoding,
}

impl DocumentKind {
    pub const ALL: [Self; 2] = [Self::Pdf, Self::Text];

    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }

    /// Determine the document kind from the path's extension (case-insensitive)
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == extension)
            .ok_or_else(|| RagError::UnsupportedFileType {
                extension: if extension.is_empty() {
                    String::new()
                } else {
                    format!(".{}", extension)
                },
            })
    }

    /// Extract the document's text
    #[inline]
    pub fn parse(self, path: &Path, encodings: &[TextEncoding]) -> Result<ParsedDocument> {
        match self {
            Self::Pdf => parse_pdf(path),
            Self::Text => parse_text(path, encodings),
        }
    }
}

/// Resolve the kind of `path` and extract its text
#[inline]
pub fn load_document(path: &Path, encodings: &[TextEncoding]) -> Result<ParsedDocument> {
    let kind = DocumentKind::from_path(path)?;
    debug!("Loading {:?} document from {}", kind, path.display());
    kind.parse(path, encodings)
}

fn parse_pdf(path: &Path) -> Result<ParsedDocument> {
    let text = pdf_extract::extract_text(path).map_err(|e| RagError::Document {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(ParsedDocument {
        text,
        decoding: Decoding::Exact(TextEncoding::Utf8),
    })
}

fn parse_text(path: &Path, encodings: &[TextEncoding]) -> Result<ParsedDocument> {
    let bytes = fs::read(path).map_err(|e| RagError::Document {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let (text, decoding) = decode_text(&bytes, encodings);
    match decoding {
        Decoding::Exact(_) => {}
        Decoding::Fallback(encoding) => {
            warn!(
                "Decoded {} with fallback encoding {}",
                path.display(),
                encoding
            );
        }
        Decoding::Lossy => {
            warn!(
                "No configured encoding could decode {}, characters may have been replaced",
                path.display()
            );
        }
    }

    Ok(ParsedDocument { text, decoding })
}
