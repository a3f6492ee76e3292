//! File-type dispatch: fingerprinting and text extraction.
//!
//! The parser turns a path on disk into an [`ExtractedText`] and a
//! [`Fingerprint`]. Plain, structured and tabular text is decoded directly;
//! markup is stripped of scripts, styles and tags; PDF and OOXML documents go
//! through an external decoding step ([`office`]).
//!
//! | Kind | Extensions |
//! |------|------------|
//! | plain text | `txt`, `log` |
//! | markdown | `md`, `markdown` |
//! | structured text | `json`, `yaml`, `yml`, `toml` |
//! | tabular text | `csv`, `tsv` |
//! | markup | `html`, `htm`, `xml` |
//! | portable document | `pdf` |
//! | office document | `docx`, `xlsx`, `pptx` |
//!
//! Files with any other extension are not picked up by directory scans, but
//! [`Parser::extract`] still decodes them as raw (lossy UTF-8) text when asked
//! directly instead of rejecting them.

pub mod markup;
pub mod office;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::models::{ExtractedText, Fingerprint};

/// How a file's bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Markdown,
    StructuredText,
    TabularText,
    Markup,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Unknown,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "log" => FileKind::PlainText,
            "md" | "markdown" => FileKind::Markdown,
            "json" | "yaml" | "yml" | "toml" => FileKind::StructuredText,
            "csv" | "tsv" => FileKind::TabularText,
            "html" | "htm" | "xml" => FileKind::Markup,
            "pdf" => FileKind::Pdf,
            "docx" => FileKind::Docx,
            "xlsx" => FileKind::Xlsx,
            "pptx" => FileKind::Pptx,
            _ => FileKind::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::PlainText => "text",
            FileKind::Markdown => "markdown",
            FileKind::StructuredText => "structured",
            FileKind::TabularText => "tabular",
            FileKind::Markup => "markup",
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Xlsx => "xlsx",
            FileKind::Pptx => "pptx",
            FileKind::Unknown => "unknown",
        }
    }
}

/// True when the path's extension is on the allowlist.
pub fn is_supported(path: &Path) -> bool {
    FileKind::from_path(path) != FileKind::Unknown
}

/// Lowercased extension, or `"unknown"` when the path has none.
pub fn file_type(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone)]
pub struct Parser {
    max_file_bytes: u64,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}

impl Parser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// Compute the size, modification time and SHA-256 of a file.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, ParseError> {
        let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Fingerprint {
            size: metadata.len(),
            modified_at: modified,
            content_hash: hash_bytes(&bytes),
            file_type: file_type(path),
        })
    }

    /// Extract plain text, a title and format metadata from a file.
    pub fn extract(&self, path: &Path) -> Result<ExtractedText, ParseError> {
        let display = path.display().to_string();
        let size = std::fs::metadata(path).map_err(|e| io_error(path, e))?.len();
        if size > self.max_file_bytes {
            return Err(ParseError::TooLarge {
                path: display,
                size,
                limit: self.max_file_bytes,
            });
        }

        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        let kind = FileKind::from_path(path);

        let (text, title) = match kind {
            FileKind::Pdf => {
                let text = office::extract_pdf(&bytes).map_err(|e| ParseError::Pdf {
                    path: display.clone(),
                    reason: format!("{:#}", e),
                })?;
                (text, None)
            }
            FileKind::Docx | FileKind::Xlsx | FileKind::Pptx => {
                let result = match kind {
                    FileKind::Docx => office::extract_docx(&bytes),
                    FileKind::Xlsx => office::extract_xlsx(&bytes),
                    _ => office::extract_pptx(&bytes),
                };
                let text = result.map_err(|e| ParseError::Office {
                    path: display.clone(),
                    reason: format!("{:#}", e),
                })?;
                (text, None)
            }
            FileKind::Markup => {
                let raw = String::from_utf8_lossy(&bytes);
                (markup::html_to_text(&raw), markup::html_title(&raw))
            }
            FileKind::Markdown => {
                let text = decode_text(&bytes);
                let title = markdown_title(&text);
                (text, title)
            }
            _ => (decode_text(&bytes), None),
        };

        let binary = matches!(
            kind,
            FileKind::Pdf | FileKind::Docx | FileKind::Xlsx | FileKind::Pptx
        );
        if binary && text.trim().is_empty() {
            return Err(ParseError::Empty { path: display });
        }

        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(path));

        let mut metadata = serde_json::json!({
            "format": kind.label(),
            "characters": text.chars().count(),
        });
        if kind == FileKind::TabularText {
            metadata["rows"] = serde_json::json!(text.lines().filter(|l| !l.trim().is_empty()).count());
        }

        Ok(ExtractedText {
            text,
            title,
            metadata,
        })
    }
}

/// SHA-256 of a byte slice, lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn io_error(path: &Path, source: std::io::Error) -> ParseError {
    ParseError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    text.replace("\r\n", "\n")
}

fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| l.starts_with("# "))
        .map(|l| l.trim_start_matches('#').trim().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn allowlist_covers_every_family() {
        for name in [
            "a.txt", "a.md", "a.json", "a.yaml", "a.csv", "a.tsv", "a.html", "a.xml", "a.pdf",
            "a.docx", "a.xlsx", "a.pptx", "A.PDF",
        ] {
            assert!(is_supported(Path::new(name)), "{} should be supported", name);
        }
        assert!(!is_supported(Path::new("a.exe")));
        assert!(!is_supported(Path::new("Makefile")));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        let parser = Parser::default();

        fs::write(&path, "first").unwrap();
        let a = parser.fingerprint(&path).unwrap();
        fs::write(&path, "second").unwrap();
        let b = parser.fingerprint(&path).unwrap();

        assert_eq!(a.size, 5);
        assert_eq!(a.file_type, "txt");
        assert_eq!(a.content_hash.len(), 64);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn markdown_title_comes_from_heading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guide.md");
        fs::write(&path, "intro line\n\n# Pilot Handbook\n\nBody.").unwrap();
        let extracted = Parser::default().extract(&path).unwrap();
        assert_eq!(extracted.title, "Pilot Handbook");
        assert_eq!(extracted.metadata["format"], "markdown");
    }

    #[test]
    fn unknown_extension_decodes_as_raw_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.weird");
        fs::write(&path, "raw body\r\nsecond line").unwrap();
        let extracted = Parser::default().extract(&path).unwrap();
        assert_eq!(extracted.text, "raw body\nsecond line");
        assert_eq!(extracted.title, "notes");
    }

    #[test]
    fn corrupt_pdf_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"not a pdf at all").unwrap();
        let err = Parser::default().extract(&path).unwrap_err();
        assert!(matches!(err, ParseError::Pdf { .. }));
    }

    #[test]
    fn corrupt_docx_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.docx");
        fs::write(&path, b"not a zip").unwrap();
        let err = Parser::default().extract(&path).unwrap_err();
        assert!(matches!(err, ParseError::Office { .. }));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(64)).unwrap();
        let parser = Parser::new(&ParserConfig { max_file_bytes: 10 });
        let err = parser.extract(&path).unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { size: 64, .. }));
    }

    #[test]
    fn tabular_metadata_counts_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        let extracted = Parser::default().extract(&path).unwrap();
        assert_eq!(extracted.metadata["rows"], 3);
    }
}
